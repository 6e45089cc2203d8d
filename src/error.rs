use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GcError {
    #[error("Dereferenced a null handle")]
    NullHandle,

    #[error("Handle target has been destroyed")]
    TargetDestroyed,

    #[error("Garbage collection already in progress")]
    CollectionInProgress,

    #[error("Heap has been dropped")]
    HeapDropped,
}
