//! ZPL document for the 4" x 3" product tag (812 x 609 dots at 203 dpi).
//!
//! Text runs rotated 90 degrees (`A0B`) so the tag reads along the bar.
//! The upper QR carries the traceability URL, the lower one the attribute
//! record.

use crate::models::label::Label;
use crate::services::identity::IdentityEncoder;

const TEMPLATE: &str = "^XA
^MMT
^PW812
^LL609
^LS0
^CI28
^FO16,410^GB130,160,3^FS
^FT53,528^A0B,30,30^FDMADE^FS
^FT91,504^A0B,30,30^FDIN^FS
^FT130,525^A0B,30,30^FDINDIA^FS
^FO161,16^GB65,556,3^FS
^FT206,540^A0B,32,32^FD{heading}^FS
^FT262,570^A0B,34,33^FDHEAT NO.^FS
^FT295,569^A0B,34,33^FD{heat}^FS
^FT260,343^A0B,14,15^FD{isi_top}^FS
^FT345,340^A0B,14,15^FD{isi_bottom}^FS
^FT339,570^A0B,25,25^FDSECTION^FS
^FT365,570^A0B,25,25^FD{section}^FS
^FT411,570^A0B,25,25^FD{grade}^FS
^FT483,570^A0B,25,25^FDID^FS
^FT516,570^A0B,31,30^FD{id}^FS
^FO536,1^GB0,570,3^FS
^FT590,218^A0B,34,33^FD{mill}^FS
^FT643,310^A0B,25,25^FDLENGTH^FS
^FT643,199^A0B,25,25^FD:^FS
^FT643,182^A0B,25,25^FD{length}^FS
^FT683,310^A0B,25,25^FDDATE^FS
^FT683,199^A0B,25,25^FD:^FS
^FT683,182^A0B,25,25^FD{date}^FS
^FT718,310^A0B,25,25^FDTIME^FS
^FT718,199^A0B,25,25^FD:^FS
^FT718,182^A0B,25,25^FD{time}^FS
^FT570,580^BQN,2,4
^FDMA,{upper_qr}^FS
^FT245,275^BQN,2,5
^FDMA,{lower_qr}^FS
^PQ1,0,1,Y
^XZ";

/// Heading printed when the record carries none.
const DEFAULT_HEADING: &str = "CHANNEL";

/// Drop the ZPL command prefixes so a field value cannot start a command.
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| *c != '^' && *c != '~').collect()
}

/// Render the print document for `label`. Same label in, same bytes out.
pub fn render_label(label: &Label, encoder: &IdentityEncoder) -> String {
    let (upper_qr, lower_qr) = encoder.encode(label);
    let heading = if label.product_heading.trim().is_empty() {
        DEFAULT_HEADING
    } else {
        &label.product_heading
    };
    let length = label
        .length
        .filter(|mm| *mm > 0)
        .map(|mm| mm.to_string())
        .unwrap_or_else(|| "STD".to_string());

    let mut doc = String::with_capacity(TEMPLATE.len() + upper_qr.len() + lower_qr.len());
    let mut rest = TEMPLATE;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        doc.push_str(&rest[..start]);
        let value: &str = match &rest[start + 1..start + len] {
            "heading" => heading,
            "heat" => &label.heat_no,
            "isi_top" => &label.isi_top,
            "isi_bottom" => &label.isi_bottom,
            "section" => &label.section,
            "grade" => &label.grade,
            "id" => &label.label_id,
            "mill" => &label.mill,
            "length" => &length,
            "date" => &label.date,
            "time" => &label.time,
            "upper_qr" => &upper_qr,
            "lower_qr" => &lower_qr,
            _ => "",
        };
        doc.push_str(&sanitize(value));
        rest = &rest[start + len + 1..];
    }
    doc.push_str(rest);
    doc
}
