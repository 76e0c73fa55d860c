//! kdeploy core types: the resource object model, error taxonomy, diagnostics and the
//! collaborator traits the orchestrator is written against.

#![forbid(unsafe_code)]

pub mod clock;
pub mod collab;
pub mod error;
pub mod events;
pub mod image;
pub mod object;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collab::{BlobTransfer, CloudContext, ClusterGateway, GetFormat, ImageResolver};
pub use error::{CodecError, DeployError, FieldError};
pub use events::{Event, EventSink, MemorySink, TracingSink};
pub use image::{ImageRef, ImageRefError};
pub use object::Object;

/// Label carrying the application name.
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
/// Label carrying the application version.
pub const VERSION_LABEL: &str = "app.kubernetes.io/version";
/// Label recording which tool manages the object.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value written under [`MANAGED_BY_LABEL`].
pub const MANAGED_BY_VALUE: &str = "kdeploy";

/// Labels that may only be set by the tool itself, never through custom labels.
pub const RESERVED_LABELS: [&str; 3] = [NAME_LABEL, VERSION_LABEL, MANAGED_BY_LABEL];

pub mod prelude {
    pub use super::{
        BlobTransfer, Clock, CloudContext, ClusterGateway, CodecError, DeployError, Event, EventSink,
        FieldError, GetFormat, ImageRef, ImageResolver, Object,
    };
}
