//! Outcome conversion traits for user-supplied bodies.

use crate::error::BoxError;
use crate::value::Payload;

/// Trait for converting the output of an action, reaction, or deferred call
/// into the engine's result type.
///
/// # Default Implementations
///
/// - `()` → success
/// - `Result<T, E>` → Delegates to inner `T` or propagates the error
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `IntoOutcome`",
    label = "missing `IntoOutcome` implementation",
    note = "Bodies must return `()` or a `Result` whose error converts into `BoxError`."
)]
pub trait IntoOutcome {
    /// Convert the output into success or a boxed error.
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        match self {
            Ok(t) => t.into_outcome(),
            Err(e) => Err(e.into()),
        }
    }
}

/// Trait for converting the output of an emitter body into an optional
/// event payload.
///
/// - `()` / `None` → nothing is emitted
/// - `Payload` / `Some(payload)` → an event carrying the payload is queued
/// - `Result<T, E>` → Delegates to inner `T` or propagates the error
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `IntoEmission`",
    label = "missing `IntoEmission` implementation",
    note = "Emitters must return a `Payload`, an `Option<Payload>`, `()`, or a `Result` of those."
)]
pub trait IntoEmission {
    /// Convert the output into an optional payload or a boxed error.
    fn into_emission(self) -> Result<Option<Payload>, BoxError>;
}

impl IntoEmission for () {
    fn into_emission(self) -> Result<Option<Payload>, BoxError> {
        Ok(None)
    }
}

impl IntoEmission for Payload {
    fn into_emission(self) -> Result<Option<Payload>, BoxError> {
        Ok(Some(self))
    }
}

impl IntoEmission for Option<Payload> {
    fn into_emission(self) -> Result<Option<Payload>, BoxError> {
        Ok(self)
    }
}

impl<T, E> IntoEmission for Result<T, E>
where
    T: IntoEmission,
    E: Into<BoxError>,
{
    fn into_emission(self) -> Result<Option<Payload>, BoxError> {
        match self {
            Ok(t) => t.into_emission(),
            Err(e) => Err(e.into()),
        }
    }
}
