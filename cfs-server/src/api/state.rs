use std::sync::Arc;

use crate::component::ComponentRegistry;
use crate::configuration::ConfigurationRegistry;
use crate::health::HealthProbe;
use crate::options::OptionsCache;
use crate::session::SessionFSM;
use crate::source::SourceRegistry;
use crate::tenancy::TenancyGate;

/// Everything a handler needs, bundled once behind `web::Data` and shared
/// across workers — the teacher's `status_handler` takes its dependency the
/// same way, just one `Data<T>` instead of this whole bundle.
pub struct AppState {
    pub options: Arc<OptionsCache>,
    pub components: Arc<ComponentRegistry>,
    pub configurations: Arc<ConfigurationRegistry>,
    pub sources: Arc<SourceRegistry>,
    pub sessions: Arc<SessionFSM>,
    pub health: Arc<HealthProbe>,
    pub tenancy: Arc<TenancyGate>,
}
