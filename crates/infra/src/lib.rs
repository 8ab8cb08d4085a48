//! Infrastructure layer: sequence allocation, collaborator ports, invoice
//! assembly and configuration.

pub mod assembler;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod sequence;

pub use assembler::InvoiceAssembler;
pub use collaborators::{
    CollaboratorError, HeaderReferences, HeaderRejection, HeaderValidator,
    InMemoryInvoiceRepository, InMemoryProductCatalog, InMemoryReferenceDirectory,
    InvoiceRepository, ProductCatalog, ReferenceKind,
};
pub use config::{EngineConfig, SequenceStrategy, build_allocator, build_sequence_store};
pub use error::InvoicingError;
pub use sequence::{
    AllocationError, InMemorySequenceStore, LockingSequenceAllocator,
    OptimisticSequenceAllocator, RetryPolicy, SequenceAllocator, SequenceRecord, SequenceStore,
    SequenceStoreError,
};
