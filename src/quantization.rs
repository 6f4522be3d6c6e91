use serde::Serialize;

use crate::model::ArtifactMetadata;

#[derive(Debug, Serialize)]
pub struct QuantizationSummary {
    pub full_precision_size_bytes: Option<u64>,
    pub quantized_size_bytes: u64,
    pub size_reduction_percent: Option<f64>,
}

impl QuantizationSummary {
    /// `None` unless the loaded artifact is a quantized one.
    pub fn from_metadata(metadata: &ArtifactMetadata) -> Option<QuantizationSummary> {
        if !metadata.quantized {
            return None;
        }

        let full_size = metadata.full_precision_size_bytes;
        let reduction = full_size.map(|full| {
            if full == 0 {
                0.0
            } else {
                let diff = full.saturating_sub(metadata.size_bytes) as f64;
                (diff / full as f64) * 100.0
            }
        });

        Some(QuantizationSummary {
            full_precision_size_bytes: full_size,
            quantized_size_bytes: metadata.size_bytes,
            size_reduction_percent: reduction,
        })
    }
}
