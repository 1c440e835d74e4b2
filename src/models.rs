// Core data structures for the niripipe pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Role a frame plays in the reduction, assigned by the data finder.
///
/// The archive itself has no notion of these roles; they are derived from
/// which matching query produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameRole {
    /// Science frame belonging to the requested observation
    Object,
    /// Flat-field frame matching the science bandpass and camera
    Flat,
    /// Dark frame with the science integration time
    Longdark,
    /// ~1 second dark used to build a fresh bad pixel mask
    Shortdark,
}

impl FrameRole {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Flat => "flat",
            Self::Longdark => "longdark",
            Self::Shortdark => "shortdark",
        }
    }

    /// All roles in the order the finder resolves them
    pub fn all() -> [Self; 4] {
        [Self::Object, Self::Flat, Self::Longdark, Self::Shortdark]
    }
}

impl std::fmt::Display for FrameRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of catalog metadata for a single exposure.
///
/// Field names deserialize directly from the catalog service's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Unique frame identifier, e.g. "N20190405S0120"
    #[serde(rename = "productID")]
    pub product_id: String,

    /// Archive-internal locator used to resolve download URLs
    #[serde(rename = "publisherID")]
    pub publisher_id: String,

    /// Parent observation batch, e.g. "GN-2019A-FT-108-12-010"
    #[serde(rename = "observationID")]
    pub observation_id: String,

    /// Filter name, e.g. "J"
    #[serde(rename = "energy_bandpassName")]
    pub bandpass: String,

    /// Integration time in seconds
    #[serde(rename = "time_exposure")]
    pub exposure_time: f64,

    /// MJD epoch of exposure start
    #[serde(rename = "time_bounds_lower")]
    pub time_lower: f64,

    /// Role assigned after matching; never present in catalog responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<FrameRole>,
}

/// Tabular result of one or more catalog queries.
///
/// Thin wrapper over the row vector so that role tagging, stacking and
/// filtering have one home instead of being spread over call sites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameTable {
    rows: Vec<FrameRecord>,
}

impl FrameTable {
    pub fn new(rows: Vec<FrameRecord>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FrameRecord] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<FrameRecord> {
        self.rows
    }

    /// Assign `role` to every row, overwriting any previous assignment
    pub fn tag_role(&mut self, role: FrameRole) {
        for row in &mut self.rows {
            row.role = Some(role);
        }
    }

    /// Keep only rows matching the predicate
    pub fn retain<F: FnMut(&FrameRecord) -> bool>(&mut self, f: F) {
        self.rows.retain(f);
    }

    /// Rows carrying a given role
    pub fn with_role(&self, role: FrameRole) -> impl Iterator<Item = &FrameRecord> {
        self.rows.iter().filter(move |r| r.role == Some(role))
    }

    /// Row-wise concatenation, consuming `other`
    pub fn stack(&mut self, other: FrameTable) {
        self.rows.extend(other.rows);
    }
}

impl IntoIterator for FrameTable {
    type Item = FrameRecord;
    type IntoIter = std::vec::IntoIter<FrameRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl FromIterator<FrameRecord> for FrameTable {
    fn from_iter<T: IntoIterator<Item = FrameRecord>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Reference metadata for one reduction run, derived from the science frames.
///
/// Populated exactly once from the object-frame query result and read-only
/// for every calibration matcher afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackContext {
    /// Full observation name, e.g. "GN-2019A-FT-108-12"
    pub obs_name: String,

    /// Observation name minus the trailing sequence component
    pub proposal_id: String,

    /// Filter of the science frames
    pub bandpass: String,

    /// Integration time of the science frames in seconds
    pub exposure_time: f64,

    /// MJD midpoint of the science exposures
    pub mjd_date: f64,

    /// Camera of the science frames, read from the frame headers
    pub camera: String,
}

impl StackContext {
    /// Create a context for the named stack, deriving the proposal id.
    ///
    /// Returns `None` when the name has no sequence component to drop.
    pub fn for_stack(obs_name: &str) -> Option<Self> {
        let (proposal_id, sequence) = obs_name.rsplit_once('-')?;
        if proposal_id.is_empty() || sequence.is_empty() {
            return None;
        }
        Some(Self {
            obs_name: obs_name.to_string(),
            proposal_id: proposal_id.to_string(),
            bandpass: String::new(),
            exposure_time: 0.0,
            mjd_date: 0.0,
            camera: String::new(),
        })
    }
}

/// Per-role matching configuration
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Minimum acceptable row count; 0 marks the role optional
    pub min_count: usize,

    /// Upper bound on query attempts
    pub max_tries: u32,
}

/// Output paths of the reduction engine, one per product.
///
/// A `None` entry means the product was skipped because its source role was
/// configured optional with a zero minimum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductSet {
    pub dark: Option<PathBuf>,
    pub bpm: Option<PathBuf>,
    pub flat: Option<PathBuf>,
    pub stack: Option<PathBuf>,
}

#[cfg(test)]
pub(crate) fn test_frame(product_id: &str, observation_id: &str, time_lower: f64) -> FrameRecord {
    FrameRecord {
        product_id: product_id.to_string(),
        publisher_id: format!("ivo://cadc.nrc.ca/GEMINI?{observation_id}/{product_id}"),
        observation_id: observation_id.to_string(),
        bandpass: "J".to_string(),
        exposure_time: 60.0,
        time_lower,
        role: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tagging_overwrites() {
        let mut table = FrameTable::new(vec![
            test_frame("N1", "GN-2019A-FT-108-12-001", 58000.0),
            test_frame("N2", "GN-2019A-FT-108-12-002", 58000.01),
        ]);
        table.tag_role(FrameRole::Object);
        assert!(table.iter().all(|r| r.role == Some(FrameRole::Object)));

        table.tag_role(FrameRole::Flat);
        assert!(table.iter().all(|r| r.role == Some(FrameRole::Flat)));
    }

    #[test]
    fn test_stack_concatenates() {
        let mut objects =
            FrameTable::new(vec![test_frame("N1", "GN-2019A-FT-108-12-001", 58000.0)]);
        objects.tag_role(FrameRole::Object);
        let mut flats = FrameTable::new(vec![test_frame("N2", "GN-CAL20190404-10-001", 58000.1)]);
        flats.tag_role(FrameRole::Flat);

        objects.stack(flats);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects.with_role(FrameRole::Flat).count(), 1);
    }

    #[test]
    fn test_record_deserializes_from_catalog_columns() {
        let json = r#"{
            "productID": "N20190405S0120",
            "publisherID": "ivo://cadc.nrc.ca/GEMINI?GN-2019A-FT-108-12-010/N20190405S0120",
            "observationID": "GN-2019A-FT-108-12-010",
            "energy_bandpassName": "J",
            "time_exposure": 60.0,
            "time_bounds_lower": 58588.2
        }"#;
        let record: FrameRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.product_id, "N20190405S0120");
        assert_eq!(record.bandpass, "J");
        assert!(record.role.is_none());
    }

    #[test]
    fn test_context_derives_proposal_id() {
        let ctx = StackContext::for_stack("GN-2019A-FT-108-12").unwrap();
        assert_eq!(ctx.proposal_id, "GN-2019A-FT-108");

        assert!(StackContext::for_stack("noseparator").is_none());
        assert!(StackContext::for_stack("dangling-").is_none());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(FrameRole::Longdark.to_string(), "longdark");
        assert_eq!(FrameRole::all().len(), 4);
    }
}
