//! The two identity payloads printed on every label.
//!
//! Payload A is a traceability URL resolved online; payload B is a flat
//! `KEY:value;` record a scanner can read offline. Both are pure functions
//! of the label.

use crate::models::label::Label;

pub const DEFAULT_BASE_URL: &str = "https://madeinindia.qcin.org";

/// Stand-in for an empty URL segment, so the path keeps its shape.
const MISSING_SEGMENT: &str = "default";

/// Unit printed when the record carries none.
const DEFAULT_UNIT: &str = "SAIL-BSP";

/// Printed in place of a length that is zero or unset.
const STANDARD_LENGTH: &str = "STD";

/// The label attributes the payloads are built from.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFields<'a> {
    pub id: &'a str,
    pub label_id: &'a str,
    pub heat_no: &'a str,
    pub unit: &'a str,
    pub mill: &'a str,
    pub section: &'a str,
    pub grade: &'a str,
    pub length: Option<i32>,
    pub weight: &'a str,
    pub location: &'a str,
    pub pqd: &'a str,
    pub date: &'a str,
    pub time: &'a str,
}

impl<'a> IdentityFields<'a> {
    /// `id` is passed in because the label's UUID has no borrowed string form.
    pub fn of(label: &'a Label, id: &'a str) -> Self {
        Self {
            id,
            label_id: &label.label_id,
            heat_no: &label.heat_no,
            unit: &label.unit,
            mill: &label.mill,
            section: &label.section,
            grade: &label.grade,
            length: label.length,
            weight: label.weight.as_deref().unwrap_or_default(),
            location: label.location.as_deref().unwrap_or_default(),
            pqd: &label.pqd,
            date: &label.date,
            time: &label.time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityEncoder {
    base_url: String,
}

impl Default for IdentityEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl IdentityEncoder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Payload A: `{base}/product-details/{label_id}/MM_{heat_no}_{id}`.
    pub fn traceability_url(&self, fields: &IdentityFields<'_>) -> String {
        fn segment(value: &str) -> &str {
            let value = value.trim();
            if value.is_empty() {
                MISSING_SEGMENT
            } else {
                value
            }
        }

        format!(
            "{}/product-details/{}/MM_{}_{}",
            self.base_url,
            segment(fields.label_id),
            segment(fields.heat_no),
            segment(fields.id),
        )
    }

    /// Payload B: twelve `KEY:value;` segments in fixed order.
    pub fn attribute_record(&self, fields: &IdentityFields<'_>) -> String {
        let unit = if fields.unit.trim().is_empty() {
            DEFAULT_UNIT
        } else {
            fields.unit
        };
        let length = match fields.length {
            Some(mm) if mm > 0 => mm.to_string(),
            _ => STANDARD_LENGTH.to_string(),
        };

        format!(
            "UNIT:{unit};MILL:{};HEAT:{};SECTION:{};GRADE:{};ID:{};LENGTH:{length};\
             WEIGHT:{};LOCATION:{};PQD:{};DATE:{};TIME:{};",
            fields.mill,
            fields.heat_no,
            fields.section,
            fields.grade,
            fields.label_id,
            fields.weight,
            fields.location,
            fields.pqd,
            fields.date,
            fields.time,
        )
    }

    /// Both payloads for a stored label.
    pub fn encode(&self, label: &Label) -> (String, String) {
        let id = label.id.to_string();
        let fields = IdentityFields::of(label, &id);
        (self.traceability_url(&fields), self.attribute_record(&fields))
    }
}
