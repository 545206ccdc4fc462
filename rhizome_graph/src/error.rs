use thiserror::Error;

/// Contract violations at the store boundary. The panicking public
/// wrappers (`add`, `add_edge`, …) surface these as panics; the `try_`
/// forms hand them back. Either way the store checks preconditions
/// before mutating, so a failed call leaves every invariant intact.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity '{0}' is already in the store")]
    DuplicateUri(String),

    #[error("entity '{0}' is not in the store")]
    MissingEntity(String),

    #[error("edge source '{0}' is not in the store")]
    MissingEdgeSource(String),

    #[error("unknown index '{kind}:{name}'")]
    UnknownIndex { kind: String, name: String },

    #[error("entity '{0}' already belongs to a store")]
    KindAlreadyAssigned(String),
}
