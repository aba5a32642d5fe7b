pub mod cloud;
pub mod coordinator;
pub mod device;
pub mod engine;
pub mod mock;
pub mod settings;
pub mod source;
pub mod state;

pub use cloud::{CloudDirectory, CloudSource, DirectoryPerson};
pub use coordinator::{start_sync_coordinator, SyncCoordinator, SyncCoordinatorConfig};
pub use device::{AddressBook, DeviceContact, DeviceSource, PermissionStatus};
pub use engine::{PushOutcome, PushReport, Synchronizer};
pub use mock::{MockAddressBook, MockCloudDirectory};
pub use settings::{PushIntent, SyncFields, SyncSettings};
pub use source::{ContactSource, SourceKind};
pub use state::{SyncPhase, SyncResult, SyncState, SyncStats};
