//! Frequency-domain building blocks: uniform partitioned convolution and a
//! windowed overlap-add spectral filter. Both run block-internally, so callers
//! may feed any buffer length; neither allocates after construction.

mod error;
pub use error::{Error, Result};

mod convolution;
pub use convolution::PartitionedConvolution;

mod ola;
pub use ola::OlaFilter;
