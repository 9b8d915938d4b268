//! Re-exports of the commonly used types and configuration structs
pub use crate::align::{AlignConfig, AlignmentMap};
pub use crate::baseline::BaselineConfig;
pub use crate::batch::{BatchResult, Cancellation, ColumnTransform};
pub use crate::centroid::CentroidConfig;
pub use crate::peak::ChromatographicPeak;
pub use crate::peak_detection::{DetectConfig, PeakBounds, PeakDetector};
pub use crate::peak_fit::{ExponentialGaussianPeakShape, PeakFitter};
pub use crate::pipeline::Pipeline;
pub use crate::signal::{IntensityMatrix, MassChannelMatrix, Selection, Signal};
pub use crate::smooth::SmoothConfig;
