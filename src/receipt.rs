//! Plain-text voter information receipts.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::voter::VoterRecord;

const TITLE: &str = "VOTER INFORMATION RECEIPT";

/// Renders the downloadable receipt for one record.
pub fn render_receipt(record: &VoterRecord, generated_on: DateTime<Utc>) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{TITLE}");
    let _ = writeln!(out, "{}", "=".repeat(TITLE.len()));
    let _ = writeln!(out);
    let _ = writeln!(out, "Name: {}", record.name);
    let _ = writeln!(out, "Voter ID: {}", record.voter_id);
    let _ = writeln!(out, "Sex/Age: {}", or_na(record.sex.as_deref()));
    let _ = writeln!(out, "Mobile: {}", or_na(record.mobile.as_deref()));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated on: {}",
        generated_on.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Source: Voting Assistant Portal");
    out
}

/// Download name for a receipt, keyed by voter id.
pub fn receipt_file_name(record: &VoterRecord) -> String {
    format!("voter-receipt-{}.txt", record.voter_id)
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record() -> VoterRecord {
        VoterRecord {
            id: 7,
            serial: Some("12".to_string()),
            name: "राहुल शर्मा".to_string(),
            sex: None,
            voter_id: "AMB5778105".to_string(),
            mobile: Some("9876543210".to_string()),
        }
    }

    #[test]
    fn receipt_lists_fields_and_placeholders() {
        let at = Utc.with_ymd_and_hms(2024, 11, 20, 9, 30, 0).unwrap();
        let text = render_receipt(&record(), at);
        assert!(text.starts_with("VOTER INFORMATION RECEIPT\n=========================\n"));
        assert!(text.contains("Name: राहुल शर्मा\n"));
        assert!(text.contains("Voter ID: AMB5778105\n"));
        assert!(text.contains("Sex/Age: N/A\n"));
        assert!(text.contains("Mobile: 9876543210\n"));
        assert!(text.contains("Generated on: 2024-11-20 09:30:00 UTC\n"));
        assert!(text.ends_with("Source: Voting Assistant Portal\n"));
    }

    #[test]
    fn file_name_uses_voter_id() {
        assert_eq!(receipt_file_name(&record()), "voter-receipt-AMB5778105.txt");
    }
}
