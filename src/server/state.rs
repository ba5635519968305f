use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::dispatch::build_dispatcher;
use crate::distributor::{create_distributor, Distributor};
use crate::hub::RealtimeHub;
use crate::redis::RedisPool;
use crate::session::{create_key_generator, SessionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Absent when upgrades are not authenticated
    pub jwt_validator: Option<Arc<JwtValidator>>,
    pub registry: Arc<SessionRegistry>,
    pub distributor: Arc<dyn Distributor>,
    pub hub: Arc<RealtimeHub>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, redis_pool: Option<Arc<RedisPool>>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let distributor = create_distributor(&settings.distributor, registry.clone(), redis_pool);
        Self::with_distributor(settings, registry, distributor)
    }

    /// Compose the state around an already built distributor.
    pub fn with_distributor(
        settings: Settings,
        registry: Arc<SessionRegistry>,
        distributor: Arc<dyn Distributor>,
    ) -> Self {
        let jwt_validator = settings
            .jwt
            .as_ref()
            .map(|jwt| Arc::new(JwtValidator::new(jwt)));

        let dispatcher = build_dispatcher(
            &settings.inbound,
            distributor.clone(),
            settings.distributor.only_one_connection_per_key,
        );
        let hub = Arc::new(RealtimeHub::new(
            registry.clone(),
            create_key_generator(&settings.session),
            dispatcher,
            settings.writer.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            registry,
            distributor,
            hub,
            start_time: Instant::now(),
        }
    }
}
