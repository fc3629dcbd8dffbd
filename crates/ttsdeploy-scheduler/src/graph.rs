//! Static service graph and profile filtering

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;
use ttsdeploy_core::{DeployError, DeployResult, Profile, ServiceDescriptor};

/// Every declared service, independent of profile
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceGraph {
    services: Vec<ServiceDescriptor>,
}

impl ServiceGraph {
    /// Create a graph, rejecting duplicate names and undeclared dependencies
    pub fn new(services: Vec<ServiceDescriptor>) -> DeployResult<Self> {
        let mut names = HashSet::new();
        for service in &services {
            if !names.insert(service.name.as_str()) {
                return Err(DeployError::DuplicateService(service.name.clone()));
            }
        }

        for service in &services {
            if let Some(dep) = service.depends_on.iter().find(|d| !names.contains(d.as_str())) {
                return Err(DeployError::UnknownDependency {
                    service: service.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        Ok(Self { services })
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Keep only the services active in `profile`
    ///
    /// Pure and idempotent; dependency edges are not checked here.
    pub fn filter(&self, profile: Profile) -> ServiceGraph {
        ServiceGraph {
            services: self
                .services
                .iter()
                .filter(|s| s.is_active_in(profile))
                .cloned()
                .collect(),
        }
    }

    /// Filter to `profile` and validate the result as a DAG
    ///
    /// At least one core service must be active and every dependency must
    /// point inside the active subset; the returned services are in
    /// dependency order.
    pub fn resolve(&self, profile: Profile) -> DeployResult<ResolvedGraph> {
        let active = self.filter(profile);
        if !active.services.iter().any(ServiceDescriptor::is_core) {
            return Err(DeployError::NoCoreService(profile));
        }
        let active_names: HashSet<&str> = active.services.iter().map(|s| s.name.as_str()).collect();

        for service in &active.services {
            for dep in &service.depends_on {
                if active_names.contains(dep.as_str()) {
                    continue;
                }
                return Err(if self.get(dep).is_some() {
                    DeployError::DependencyOutsideProfile {
                        service: service.name.clone(),
                        dependency: dep.clone(),
                        profile,
                    }
                } else {
                    DeployError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dep.clone(),
                    }
                });
            }
        }

        let services = topological_order(active.services)?;
        debug!(
            profile = %profile,
            services = ?services.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Resolved service graph"
        );

        Ok(ResolvedGraph { profile, services })
    }
}

/// Kahn's algorithm, ties broken by declaration order
fn topological_order(services: Vec<ServiceDescriptor>) -> DeployResult<Vec<ServiceDescriptor>> {
    let index: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut in_degree: Vec<usize> = services.iter().map(|s| s.depends_on.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
    for (i, service) in services.iter().enumerate() {
        for dep in &service.depends_on {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..services.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(services.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push_back(d);
            }
        }
    }

    if order.len() < services.len() {
        let mut stuck: Vec<String> = (0..services.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| services[i].name.clone())
            .collect();
        stuck.sort();
        return Err(DeployError::DependencyCycle(stuck));
    }

    let mut slots: Vec<Option<ServiceDescriptor>> = services.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// The active, validated services of one profile in dependency order
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    profile: Profile,
    services: Vec<ServiceDescriptor>,
}

impl ResolvedGraph {
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Services in dependency order
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Drop every volume whose host path is one of `hosts`
    ///
    /// The runtime would otherwise create the absent host directory itself.
    pub fn without_mounts(mut self, hosts: &[&Path]) -> Self {
        for service in &mut self.services {
            service.volumes.retain(|volume| {
                let keep = !hosts.contains(&volume.host.as_path());
                if !keep {
                    debug!(
                        service = %service.name,
                        host = %volume.host.display(),
                        "Not mounting unavailable optional asset"
                    );
                }
                keep
            });
        }
        self
    }
}
