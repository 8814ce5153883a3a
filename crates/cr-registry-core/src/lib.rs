mod bootstrap;
mod error;
mod gateway;
mod view;

pub use bootstrap::Bootstrapper;
pub use error::RegistryError;
pub use gateway::{Gateway, MutationOutcome};
pub use view::{REGISTERED_MESSAGE, REMOVED_MESSAGE, ViewController};
