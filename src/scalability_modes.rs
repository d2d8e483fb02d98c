//! Parsing of scalability mode strings like `L1T3` or `S3T3_KEY` used by simulcast and SVC
//! encodings.


use once_cell::sync::Lazy;
use regex::Regex;

static SCALABILITY_MODE_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[LS]([1-9][0-9]?)T([1-9][0-9]?)(_KEY)?").ok());

/// Number of spatial and temporal layers of an RTP stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ScalabilityMode {
    /// Number of spatial layers.
    pub spatial_layers: u8,
    /// Number of temporal layers.
    pub temporal_layers: u8,
    /// K-SVC mode.
    pub ksvc: bool,
}

impl Default for ScalabilityMode {
    fn default() -> Self {
        Self {
            spatial_layers: 1,
            temporal_layers: 1,
            ksvc: false,
        }
    }
}

/// Parse scalability mode, anything unrecognized results in a single spatial and temporal layer.
#[must_use]
pub fn parse(scalability_mode: Option<&str>) -> ScalabilityMode {
    scalability_mode
        .and_then(|scalability_mode| {
            let captures = SCALABILITY_MODE_REGEX.as_ref()?.captures(scalability_mode)?;

            Some(ScalabilityMode {
                spatial_layers: captures.get(1)?.as_str().parse().ok()?,
                temporal_layers: captures.get(2)?.as_str().parse().ok()?,
                ksvc: captures.get(3).is_some(),
            })
        })
        .unwrap_or_default()
}
