pub mod address;
pub mod common;
pub mod service;

pub use address::{
    AddressError, PollOutcome, ResolverConfig, ServiceAddress, ServiceStore,
    resolve_service_address,
};
pub use common::{API_VERSION, FIELD_MANAGER, KIND, owner_reference, standard_labels};
