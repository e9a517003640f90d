pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubExpressionBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractExpressionBackend;
