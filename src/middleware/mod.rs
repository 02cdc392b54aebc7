pub mod observe;

pub use observe::Observability;
