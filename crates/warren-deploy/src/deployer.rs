//! The deployment orchestrator.

use std::sync::Arc;
use std::time::Duration;

use warren_kernel::{Command, ServiceSpec, State};
use warren_store::{Store, StoreError};
use warren_types::{
    ActualState, DeployMeta, DeployState, DeployStrategy, Service, ServiceId, Timestamp,
};

use crate::arith::{batches, canary_split};
use crate::error::DeployError;

/// Gate timings. Production defaults match the health-wait protocol:
/// initial wait = the service's update grace period, then poll every
/// 5 s with an overall 5 minute timeout.
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    pub health_poll: Duration,
    pub health_timeout: Duration,
    /// Transient submit retries before a deployment aborts.
    pub submit_retries: u32,
    pub submit_backoff: Duration,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            health_poll: Duration::from_secs(5),
            health_timeout: Duration::from_secs(300),
            submit_retries: 3,
            submit_backoff: Duration::from_millis(500),
        }
    }
}

/// Executes version transitions through the store's command pipeline.
#[derive(Clone)]
pub struct Deployer {
    store: Store,
    config: DeployerConfig,
}

impl Deployer {
    pub fn new(store: Store, config: DeployerConfig) -> Self {
        Self { store, config }
    }

    /// Transitions `service_id` to `image` using `strategy`, defaulting
    /// to the strategy in the service's update config.
    pub async fn update(
        &self,
        service_id: ServiceId,
        image: String,
        strategy: Option<DeployStrategy>,
    ) -> Result<(), DeployError> {
        let snapshot = self.store.read_snapshot();
        let service = snapshot
            .service(&service_id)
            .ok_or(DeployError::ServiceNotFound(service_id))?
            .clone();
        let strategy = strategy.unwrap_or(service.update.strategy);

        tracing::info!(
            component = "deployer",
            service = %service_id,
            %image,
            %strategy,
            "starting update"
        );

        match strategy {
            DeployStrategy::Rolling => self.rolling(&service, image).await,
            DeployStrategy::BlueGreen => self.blue_green(&service, image).await,
            DeployStrategy::Canary => self.canary(&service, image).await,
        }
    }

    /// Reverts `service_id` to its recorded standby version.
    pub async fn rollback(&self, service_id: ServiceId) -> Result<(), DeployError> {
        let snapshot = self.store.read_snapshot();
        let service = snapshot
            .service(&service_id)
            .ok_or(DeployError::ServiceNotFound(service_id))?;
        let standby = snapshot
            .services()
            .find(|s| {
                s.deploy.origin == Some(service_id) && s.deploy.state == DeployState::Standby
            })
            .ok_or(DeployError::NoStandby(service_id))?;

        tracing::info!(
            component = "deployer",
            service = %service_id,
            standby = %standby.id,
            "rolling back to standby"
        );

        self.submit(Command::SetDeployMeta {
            id: standby.id,
            meta: DeployMeta {
                state: DeployState::Active,
                ..standby.deploy.clone()
            },
        })
        .await?;
        self.submit(Command::ScaleService {
            id: standby.id,
            replicas: service.replicas,
        })
        .await?;
        self.submit(Command::SetDeployMeta {
            id: service_id,
            meta: DeployMeta {
                state: DeployState::RolledBack,
                ..service.deploy.clone()
            },
        })
        .await?;
        // The failed version keeps its record (replicas 0) so operators
        // can inspect its configuration.
        self.submit(Command::ScaleService {
            id: service_id,
            replicas: 0,
        })
        .await?;
        Ok(())
    }

    // ========================================================================
    // Rolling
    // ========================================================================

    async fn rolling(&self, service: &Service, image: String) -> Result<(), DeployError> {
        // Image first: every replacement the scheduler creates from here
        // on uses the new version. Convergent but not transactional — a
        // crash mid-update leaves a mixed-version, observable state.
        self.submit(Command::SetServiceImage {
            id: service.id,
            image: image.clone(),
        })
        .await?;

        let snapshot = self.store.read_snapshot();
        let old: Vec<_> = snapshot
            .instances_of(service.id)
            .filter(|i| i.is_live() && i.image != image)
            .map(|i| i.id)
            .collect();

        let parts = batches(old, service.update.parallelism);
        let total = parts.len();
        for (n, batch) in parts.into_iter().enumerate() {
            tracing::info!(
                component = "deployer",
                service = %service.id,
                batch = n + 1,
                of = total,
                size = batch.len(),
                "rolling batch"
            );
            for instance in batch {
                self.submit(Command::MarkInstanceShutdown { id: instance })
                    .await?;
            }
            if n + 1 < total {
                tokio::time::sleep(service.update.delay).await;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Blue/green
    // ========================================================================

    async fn blue_green(&self, service: &Service, image: String) -> Result<(), DeployError> {
        let version = next_version(service);
        let clone_id = self
            .create_clone(service, &image, &version, service.replicas, DeployState::Standby)
            .await?;

        let gate = self
            .wait_all_healthy(clone_id, service.replicas as usize, service.update.grace_period)
            .await;
        if gate.is_err() {
            tracing::warn!(
                component = "deployer",
                service = %service.id,
                clone = %clone_id,
                "clone never became healthy, deleting"
            );
            self.submit(Command::DeleteService { id: clone_id }).await?;
            return gate;
        }

        // Cutover is two label flips; routing follows the active label.
        self.set_state(clone_id, DeployState::Active).await?;
        self.set_state(service.id, DeployState::Standby).await?;
        tracing::info!(component = "deployer", service = %service.id, clone = %clone_id, "blue/green cutover complete");
        Ok(())
    }

    // ========================================================================
    // Canary
    // ========================================================================

    async fn canary(&self, service: &Service, image: String) -> Result<(), DeployError> {
        let version = next_version(service);
        let total = service.replicas;
        let canary_id = self
            .create_clone(service, &image, &version, 1, DeployState::Canary)
            .await?;

        if self
            .wait_all_healthy(canary_id, 1, service.update.grace_period)
            .await
            .is_err()
        {
            return self.canary_rollback(service.id, canary_id, total).await;
        }

        let steps = service.update.canary_steps.clone();
        let last = steps.len().saturating_sub(1);
        for (n, weight) in steps.into_iter().enumerate() {
            let (canary_replicas, stable_replicas) = canary_split(total, weight);
            tracing::info!(
                component = "deployer",
                service = %service.id,
                canary = %canary_id,
                weight,
                canary_replicas,
                stable_replicas,
                "advancing canary"
            );
            self.submit(Command::ScaleService {
                id: canary_id,
                replicas: canary_replicas,
            })
            .await?;
            self.submit(Command::ScaleService {
                id: service.id,
                replicas: stable_replicas,
            })
            .await?;

            if self
                .wait_all_healthy(canary_id, canary_replicas as usize, service.update.grace_period)
                .await
                .is_err()
            {
                return self.canary_rollback(service.id, canary_id, total).await;
            }

            if n < last {
                tokio::time::sleep(service.update.stability_window).await;
            }
        }

        // Final step done: the canary becomes the service.
        self.set_state(canary_id, DeployState::Active).await?;
        self.set_state(service.id, DeployState::Standby).await?;
        self.submit(Command::ScaleService {
            id: service.id,
            replicas: 0,
        })
        .await?;
        tracing::info!(component = "deployer", service = %service.id, canary = %canary_id, "canary promoted");
        Ok(())
    }

    /// Restores the stable replica count and removes the canary,
    /// labeling it rolled-back on the way out for the event trail.
    async fn canary_rollback(
        &self,
        service_id: ServiceId,
        canary_id: ServiceId,
        stable_replicas: u32,
    ) -> Result<(), DeployError> {
        tracing::warn!(
            component = "deployer",
            service = %service_id,
            canary = %canary_id,
            "canary unhealthy, rolling back"
        );
        self.submit(Command::ScaleService {
            id: service_id,
            replicas: stable_replicas,
        })
        .await?;
        self.set_state(canary_id, DeployState::RolledBack).await?;
        self.set_state(service_id, DeployState::Active).await?;
        self.submit(Command::DeleteService { id: canary_id }).await?;
        Err(DeployError::RolledBack)
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    async fn create_clone(
        &self,
        service: &Service,
        image: &str,
        version: &str,
        replicas: u32,
        state: DeployState,
    ) -> Result<ServiceId, DeployError> {
        let clone_id = ServiceId::generate();
        let spec = ServiceSpec {
            name: format!("{}-{version}", service.name),
            image: image.to_string(),
            replicas,
            mode: service.mode,
            env: service.env.clone(),
            mounts: service.mounts.clone(),
            secrets: service.secrets.clone(),
            volumes: service.volumes.clone(),
            resources: service.resources,
            restart: service.restart,
            update: service.update.clone(),
            health_check: service.health_check.clone(),
            labels: service.labels.clone(),
        };
        self.submit(Command::CreateService {
            id: clone_id,
            spec,
            created_at: Timestamp::now(),
        })
        .await?;
        self.submit(Command::SetDeployMeta {
            id: clone_id,
            meta: DeployMeta {
                state,
                version: Some(version.to_string()),
                origin: Some(service.id),
            },
        })
        .await?;
        Ok(clone_id)
    }

    async fn set_state(&self, id: ServiceId, state: DeployState) -> Result<(), DeployError> {
        let snapshot = self.store.read_snapshot();
        let service = snapshot
            .service(&id)
            .ok_or(DeployError::ServiceNotFound(id))?;
        self.submit(Command::SetDeployMeta {
            id,
            meta: DeployMeta {
                state,
                ..service.deploy.clone()
            },
        })
        .await
    }

    /// Waits until `service` has `expected` instances running and
    /// healthy: an initial grace wait, then polling until the timeout.
    async fn wait_all_healthy(
        &self,
        service: ServiceId,
        expected: usize,
        initial: Duration,
    ) -> Result<(), DeployError> {
        tokio::time::sleep(initial).await;
        let started = tokio::time::Instant::now();
        loop {
            if all_healthy(&self.store.read_snapshot(), service, expected) {
                return Ok(());
            }
            if started.elapsed() >= self.config.health_timeout {
                return Err(DeployError::HealthGateTimeout(service));
            }
            tokio::time::sleep(self.config.health_poll).await;
        }
    }

    /// Submits with bounded retries on transient (leadership/timeout)
    /// failures; apply rejections abort immediately.
    async fn submit(&self, command: Command) -> Result<(), DeployError> {
        let mut attempt = 0;
        loop {
            match self.store.submit(command.clone()).await {
                Ok(()) => return Ok(()),
                Err(
                    e @ (StoreError::NotLeader { .. }
                    | StoreError::Timeout
                    | StoreError::Superseded),
                ) if attempt < self.config.submit_retries => {
                    attempt += 1;
                    tracing::debug!(
                        component = "deployer",
                        kind = command.kind(),
                        attempt,
                        error = %e,
                        "transient submit failure, retrying"
                    );
                    tokio::time::sleep(self.config.submit_backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn all_healthy(state: &Arc<State>, service: ServiceId, expected: usize) -> bool {
    let live: Vec<_> = state
        .instances_of(service)
        .filter(|i| i.is_live())
        .collect();
    live.len() >= expected
        && live
            .iter()
            .all(|i| i.actual == ActualState::Running && i.health.healthy)
}

/// Version tags count up from the service's generation, which bumps on
/// every spec mutation, so successive deployments never collide on the
/// clone name.
fn next_version(service: &Service) -> String {
    format!("v{}", service.generation + 1)
}
