use chrono::{DateTime, Utc};
use garde::Validate;
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Print status of a label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LabelStatus {
    Pending,
    Printed,
    Failed,
}

/// A persisted label: one row per physical item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: Uuid,
    pub label_id: String,
    pub dedup_key: String,
    pub heat_no: String,
    pub section: String,
    pub grade: String,
    pub mill: String,
    pub unit: String,
    pub bundle_no: String,
    pub product_heading: String,
    pub isi_top: String,
    pub isi_bottom: String,
    pub length: Option<i32>,
    pub weight: Option<String>,
    pub location: Option<String>,
    pub pqd: String,
    pub date: String,
    pub time: String,
    pub charge_dtm: String,
    pub user_id: Option<Uuid>,
    pub status: LabelStatus,
    pub is_duplicate: bool,
    pub printed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a label classified as new.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLabel {
    pub label_id: String,
    pub dedup_key: String,
    pub heat_no: String,
    pub section: String,
    pub grade: String,
    pub mill: String,
    pub unit: String,
    pub bundle_no: String,
    pub product_heading: String,
    pub isi_top: String,
    pub isi_bottom: String,
    pub length: Option<i32>,
    pub weight: Option<String>,
    pub location: Option<String>,
    pub pqd: String,
    pub date: String,
    pub time: String,
    pub charge_dtm: String,
    pub user_id: Option<Uuid>,
}

impl NewLabel {
    /// Materialize the row a store hands back after inserting this payload.
    pub fn into_label(self, id: Uuid, now: DateTime<Utc>) -> Label {
        Label {
            id,
            label_id: self.label_id,
            dedup_key: self.dedup_key,
            heat_no: self.heat_no,
            section: self.section,
            grade: self.grade,
            mill: self.mill,
            unit: self.unit,
            bundle_no: self.bundle_no,
            product_heading: self.product_heading,
            isi_top: self.isi_top,
            isi_bottom: self.isi_bottom,
            length: self.length,
            weight: self.weight,
            location: self.location,
            pqd: self.pqd,
            date: self.date,
            time: self.time,
            charge_dtm: self.charge_dtm,
            user_id: self.user_id,
            status: LabelStatus::Pending,
            is_duplicate: false,
            printed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Raw upload shapes ───────────────────────────────────────────────

/// Accept any JSON scalar as an optional string. Numbers keep their JSON text
/// form, so `BUNDLE_NOS: 1` and `"bundle_no": "1"` read the same.
fn lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Upper-case record shape exported by the mill's tracking system.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyRecord {
    #[serde(rename = "ID", default, deserialize_with = "lenient")]
    pub label_id: Option<String>,
    #[serde(rename = "HEAT_NO", default, deserialize_with = "lenient")]
    pub heat_no: Option<String>,
    #[serde(rename = "SECTION", default, deserialize_with = "lenient")]
    pub section: Option<String>,
    #[serde(rename = "GRADE", default, deserialize_with = "lenient")]
    pub grade: Option<String>,
    #[serde(rename = "MILL", default, deserialize_with = "lenient")]
    pub mill: Option<String>,
    #[serde(rename = "UNIT", default, deserialize_with = "lenient")]
    pub unit: Option<String>,
    #[serde(rename = "BUNDLE_NOS", alias = "BUNDLE_NO", default, deserialize_with = "lenient")]
    pub bundle_no: Option<String>,
    #[serde(rename = "PRODUCT_HEADING", default, deserialize_with = "lenient")]
    pub product_heading: Option<String>,
    #[serde(rename = "ISI_TOP", default, deserialize_with = "lenient")]
    pub isi_top: Option<String>,
    #[serde(rename = "ISI_BOTTOM", default, deserialize_with = "lenient")]
    pub isi_bottom: Option<String>,
    #[serde(rename = "LENGTH", default, deserialize_with = "lenient")]
    pub length: Option<String>,
    #[serde(rename = "WEIGHT", default, deserialize_with = "lenient")]
    pub weight: Option<String>,
    #[serde(rename = "LOCATION", default, deserialize_with = "lenient")]
    pub location: Option<String>,
    #[serde(rename = "PQD", default, deserialize_with = "lenient")]
    pub pqd: Option<String>,
    #[serde(rename = "DATE1", alias = "DATE", default, deserialize_with = "lenient")]
    pub date: Option<String>,
    #[serde(rename = "TIME1", alias = "TIME", default, deserialize_with = "lenient")]
    pub time: Option<String>,
    #[serde(rename = "CHARGE_DTM", alias = "charge_dtm", default, deserialize_with = "lenient")]
    pub charge_dtm: Option<String>,
    /// Keys in the other naming convention, dropped by shape detection.
    #[serde(skip)]
    pub ignored_keys: Vec<String>,
}

/// Lower-case record shape used by newer uploaders and the label API itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizedRecord {
    #[serde(alias = "actual_label_id", default, deserialize_with = "lenient")]
    pub label_id: Option<String>,
    #[serde(alias = "heat", default, deserialize_with = "lenient")]
    pub heat_no: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub grade: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub mill: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub unit: Option<String>,
    #[serde(alias = "bundle", alias = "bundle_nos", default, deserialize_with = "lenient")]
    pub bundle_no: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub product_heading: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub isi_top: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub isi_bottom: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub length: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub weight: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub pqd: Option<String>,
    #[serde(alias = "date1", default, deserialize_with = "lenient")]
    pub date: Option<String>,
    #[serde(alias = "time1", default, deserialize_with = "lenient")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub charge_dtm: Option<String>,
    /// Keys in the other naming convention, dropped by shape detection.
    #[serde(skip)]
    pub ignored_keys: Vec<String>,
}

const LEGACY_KEYS: &[&str] = &[
    "ID",
    "HEAT_NO",
    "SECTION",
    "GRADE",
    "MILL",
    "UNIT",
    "BUNDLE_NOS",
    "BUNDLE_NO",
    "PRODUCT_HEADING",
    "ISI_TOP",
    "ISI_BOTTOM",
    "LENGTH",
    "WEIGHT",
    "LOCATION",
    "PQD",
    "DATE1",
    "DATE",
    "TIME1",
    "TIME",
    "CHARGE_DTM",
];

const NORMALIZED_KEYS: &[&str] = &[
    "label_id",
    "actual_label_id",
    "heat_no",
    "heat",
    "section",
    "grade",
    "mill",
    "unit",
    "bundle_no",
    "bundle",
    "bundle_nos",
    "product_heading",
    "isi_top",
    "isi_bottom",
    "length",
    "weight",
    "location",
    "pqd",
    "date",
    "date1",
    "time",
    "time1",
];

/// An uploaded record in whichever naming convention it arrived in.
///
/// The shape is decided once, by counting which convention's keys the object
/// carries (ties go to the normalized shape). Everything downstream works on
/// [`CanonicalRecord`].
#[derive(Debug, Clone)]
pub enum RawLabelRecord {
    Legacy(LegacyRecord),
    Normalized(NormalizedRecord),
}

impl RawLabelRecord {
    fn is_legacy_shape(map: &Map<String, Value>) -> bool {
        let legacy = map.keys().filter(|k| LEGACY_KEYS.contains(&k.as_str())).count();
        let normalized = map
            .keys()
            .filter(|k| NORMALIZED_KEYS.contains(&k.as_str()))
            .count();
        legacy > normalized
    }

    /// Keys that belong to the convention this record was not read as.
    fn foreign_keys(map: &Map<String, Value>, foreign: &[&str]) -> Vec<String> {
        map.keys()
            .filter(|k| foreign.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Keys the upload carried in the other naming convention. Their values
    /// are not part of the record.
    pub fn ignored_keys(&self) -> &[String] {
        match self {
            RawLabelRecord::Legacy(r) => &r.ignored_keys,
            RawLabelRecord::Normalized(r) => &r.ignored_keys,
        }
    }

    /// Collapse either shape into the canonical record. Missing fields become
    /// empty strings.
    pub fn normalize(&self) -> CanonicalRecord {
        fn take(v: &Option<String>) -> String {
            v.as_deref().map(str::trim).unwrap_or_default().to_string()
        }

        match self {
            RawLabelRecord::Legacy(r) => CanonicalRecord {
                label_id: take(&r.label_id),
                heat_no: take(&r.heat_no),
                section: take(&r.section),
                grade: take(&r.grade),
                mill: take(&r.mill),
                unit: take(&r.unit),
                bundle_no: take(&r.bundle_no),
                product_heading: take(&r.product_heading),
                isi_top: take(&r.isi_top),
                isi_bottom: take(&r.isi_bottom),
                length: take(&r.length),
                weight: take(&r.weight),
                location: take(&r.location),
                pqd: take(&r.pqd),
                date: take(&r.date),
                time: take(&r.time),
                charge_dtm: take(&r.charge_dtm),
            },
            RawLabelRecord::Normalized(r) => CanonicalRecord {
                label_id: take(&r.label_id),
                heat_no: take(&r.heat_no),
                section: take(&r.section),
                grade: take(&r.grade),
                mill: take(&r.mill),
                unit: take(&r.unit),
                bundle_no: take(&r.bundle_no),
                product_heading: take(&r.product_heading),
                isi_top: take(&r.isi_top),
                isi_bottom: take(&r.isi_bottom),
                length: take(&r.length),
                weight: take(&r.weight),
                location: take(&r.location),
                pqd: take(&r.pqd),
                date: take(&r.date),
                time: take(&r.time),
                charge_dtm: take(&r.charge_dtm),
            },
        }
    }
}

impl<'de> Deserialize<'de> for RawLabelRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        if Self::is_legacy_shape(&map) {
            let ignored_keys = Self::foreign_keys(&map, NORMALIZED_KEYS);
            serde_json::from_value(Value::Object(map))
                .map(|r| RawLabelRecord::Legacy(LegacyRecord { ignored_keys, ..r }))
                .map_err(D::Error::custom)
        } else {
            let ignored_keys = Self::foreign_keys(&map, LEGACY_KEYS);
            serde_json::from_value(Value::Object(map))
                .map(|r| RawLabelRecord::Normalized(NormalizedRecord { ignored_keys, ..r }))
                .map_err(D::Error::custom)
        }
    }
}

/// A record after normalization: every field present, trimmed, possibly empty.
///
/// Validation never rejects a record; violations are reported as warnings on
/// the batch result.
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct CanonicalRecord {
    #[garde(length(min = 1, max = 255))]
    pub label_id: String,
    #[garde(length(min = 1, max = 100))]
    pub heat_no: String,
    #[garde(length(min = 1, max = 255))]
    pub section: String,
    #[garde(length(min = 1, max = 100))]
    pub grade: String,
    #[garde(length(min = 1, max = 50))]
    pub mill: String,
    #[garde(length(max = 50))]
    pub unit: String,
    #[garde(length(min = 1, max = 50))]
    pub bundle_no: String,
    #[garde(length(max = 255))]
    pub product_heading: String,
    #[garde(length(max = 255))]
    pub isi_top: String,
    #[garde(length(max = 255))]
    pub isi_bottom: String,
    #[garde(custom(length_value))]
    pub length: String,
    #[garde(length(max = 50))]
    pub weight: String,
    #[garde(length(max = 100))]
    pub location: String,
    #[garde(length(max = 255))]
    pub pqd: String,
    #[garde(length(max = 20))]
    pub date: String,
    #[garde(length(max = 10))]
    pub time: String,
    #[garde(length(max = 255))]
    pub charge_dtm: String,
}

/// `LENGTH` is either a millimetre count, the literal `STD`, or absent.
#[allow(clippy::ptr_arg)]
fn length_value(value: &String, _ctx: &()) -> garde::Result {
    if value.is_empty() || value.eq_ignore_ascii_case("STD") || value.parse::<i32>().is_ok() {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "expected a whole number of millimetres or STD, got '{value}'"
        )))
    }
}

impl CanonicalRecord {
    /// Parsed length; `STD`, zero, and unparseable values read as unset.
    pub fn length_mm(&self) -> Option<i32> {
        self.length.parse::<i32>().ok().filter(|l| *l > 0)
    }

    /// Human-facing label id, falling back to the PQD reference when the
    /// upload carried no explicit id.
    pub fn display_id(&self) -> &str {
        if self.label_id.is_empty() {
            &self.pqd
        } else {
            &self.label_id
        }
    }

    pub fn into_new_label(self, dedup_key: String, user_id: Option<Uuid>) -> NewLabel {
        fn optional(v: String) -> Option<String> {
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        }

        NewLabel {
            label_id: self.display_id().to_string(),
            length: self.length_mm(),
            dedup_key,
            heat_no: self.heat_no,
            section: self.section,
            grade: self.grade,
            mill: self.mill,
            unit: self.unit,
            bundle_no: self.bundle_no,
            product_heading: self.product_heading,
            isi_top: self.isi_top,
            isi_bottom: self.isi_bottom,
            weight: optional(self.weight),
            location: optional(self.location),
            pqd: self.pqd,
            date: self.date,
            time: self.time,
            charge_dtm: self.charge_dtm,
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_shape_detected() {
        let raw: RawLabelRecord = serde_json::from_value(json!({
            "HEAT_NO": "C103262",
            "ID": "2025014374",
            "SECTION": "CHANNEL 75*40*4.8",
            "GRADE": "IS 2062 EZSOBR",
            "MILL": "MM",
            "BUNDLE_NOS": 1,
            "UNIT": "MM",
            "LENGTH": "12000",
            "charge_dtm": "2025014374"
        }))
        .unwrap();

        assert!(matches!(raw, RawLabelRecord::Legacy(_)));
        let canonical = raw.normalize();
        assert_eq!(canonical.heat_no, "C103262");
        assert_eq!(canonical.bundle_no, "1");
        assert_eq!(canonical.charge_dtm, "2025014374");
        assert_eq!(canonical.length_mm(), Some(12000));
    }

    #[test]
    fn test_normalized_shape_with_short_aliases() {
        let raw: RawLabelRecord = serde_json::from_value(json!({
            "heat": "C103262",
            "mill": "MM",
            "section": "CHANNEL 75*40*4.8",
            "grade": "IS 2062 EZSOBR",
            "bundle": "1",
            "unit": "MM"
        }))
        .unwrap();

        assert!(matches!(raw, RawLabelRecord::Normalized(_)));
        let canonical = raw.normalize();
        assert_eq!(canonical.heat_no, "C103262");
        assert_eq!(canonical.bundle_no, "1");
        assert_eq!(canonical.label_id, "");
    }

    #[test]
    fn test_both_shapes_normalize_identically() {
        let legacy: RawLabelRecord = serde_json::from_value(json!({
            "HEAT_NO": " C075400 ", "SECTION": "TMT BAR 25", "GRADE": "IS 1786 FE550D",
            "MILL": "MM", "BUNDLE_NOS": 6, "UNIT": "SAIL-BSP", "DATE1": "04-MAR-24",
            "TIME1": "14:21", "PQD": "101520002123005267", "ID": "001"
        }))
        .unwrap();
        let normalized: RawLabelRecord = serde_json::from_value(json!({
            "heat_no": "C075400", "section": "TMT BAR 25", "grade": "IS 1786 FE550D",
            "mill": "MM", "bundle_no": "6", "unit": "SAIL-BSP", "date": "04-MAR-24",
            "time": "14:21", "pqd": "101520002123005267", "label_id": "001"
        }))
        .unwrap();

        assert_eq!(legacy.normalize(), normalized.normalize());
    }

    #[test]
    fn test_mixed_conventions_report_dropped_keys() {
        let raw: RawLabelRecord =
            serde_json::from_value(json!({ "HEAT_NO": "H1", "mill": "MM", "grade": "E250" }))
                .unwrap();

        assert!(matches!(raw, RawLabelRecord::Normalized(_)));
        assert_eq!(raw.ignored_keys(), ["HEAT_NO".to_string()]);
        assert_eq!(raw.normalize().heat_no, "");
    }

    #[test]
    fn test_single_convention_ignores_nothing() {
        let raw: RawLabelRecord =
            serde_json::from_value(json!({ "HEAT_NO": "H1", "MILL": "MM", "charge_dtm": "x" }))
                .unwrap();
        assert!(raw.ignored_keys().is_empty());
    }

    #[test]
    fn test_std_length_is_unset() {
        let record = CanonicalRecord {
            length: "STD".to_string(),
            ..Default::default()
        };
        assert_eq!(record.length_mm(), None);
        assert!(length_value(&"STD".to_string(), &()).is_ok());
        assert!(length_value(&"twelve".to_string(), &()).is_err());
    }

    #[test]
    fn test_missing_fields_fail_validation_without_panicking() {
        let record = CanonicalRecord::default();
        let report = record.validate().unwrap_err();
        assert!(report.iter().count() >= 5);
    }

    #[test]
    fn test_display_id_falls_back_to_pqd() {
        let record = CanonicalRecord {
            pqd: "CHANNEL001".to_string(),
            ..Default::default()
        };
        assert_eq!(record.display_id(), "CHANNEL001");
        let new_label = record.into_new_label("K".to_string(), None);
        assert_eq!(new_label.label_id, "CHANNEL001");
        assert_eq!(new_label.weight, None);
    }
}
