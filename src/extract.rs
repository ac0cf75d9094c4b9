//! Field extraction from rendered CRM pages
//!
//! Pages are read as `innerText` (table cells separated by tabs, rows by
//! newlines) or, when only markup is available, as HTML run through
//! [`strip_tags`]. Everything here is pure so it can be tested without a
//! browser.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[-/.]\d{1,2}[-/.]\d{4}|\d{1,2}[ -](?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*,?[ -]\d{4})\b",
        )
        .expect("date regex")
    })
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\()?\s*(-)?\s*(?:[^\d\s(),.-]{1,4}\.?\s*)?(-)?(\d[\d,]*(?:\.\d+)?|\.\d+)\s*(\))?")
            .expect("amount regex")
    })
}

/// Statuses the CRM renders as badges on proposals, proformas and invoices
const STATUSES: &[&str] = &[
    "Partially Paid",
    "Paid",
    "Unpaid",
    "Overdue",
    "Draft",
    "Cancelled",
    "Accepted",
    "Declined",
    "Sent",
    "Open",
];

/// A money value held in minor units (hundredths)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount {
    minor: i64,
}

impl Amount {
    pub const ZERO: Amount = Amount { minor: 0 };

    pub fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    pub fn from_major(major: i64) -> Self {
        Self {
            minor: major.saturating_mul(100),
        }
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.minor.checked_sub(other.minor).map(Amount::from_minor)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.minor.checked_add(other.minor).map(Amount::from_minor)
    }

    /// Multiply by a quantity, e.g. line item rate * qty; saturates at the
    /// `i64` bounds
    pub fn times(self, qty: u32) -> Amount {
        Amount::from_minor(self.minor.saturating_mul(i64::from(qty)))
    }

    /// Plain decimal form suitable for typing into an input (`1234.50`)
    pub fn to_input(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

impl TryFrom<String> for Amount {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_amount(&value).ok_or_else(|| format!("not an amount: '{}'", value))
    }
}

/// Parse the first money value in `s`
///
/// Accepts currency symbols or codes before the number, thousands separators
/// (including lakh grouping), a bare fraction such as `.50`, and negatives
/// written as `-1.00` or `(1.00)`. Commas are always treated as grouping,
/// `.` as the decimal point.
pub fn parse_amount(s: &str) -> Option<Amount> {
    let caps = amount_re().captures(s)?;
    let number = caps.get(4)?.as_str().replace(',', "");
    let negative = caps.get(2).is_some()
        || caps.get(3).is_some()
        || (caps.get(1).is_some() && caps.get(5).is_some());

    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (number.as_str(), ""),
    };
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut cents = 0i64;
    let digits: Vec<u32> = frac.chars().filter_map(|c| c.to_digit(10)).collect();
    if let Some(d) = digits.first() {
        cents += i64::from(*d) * 10;
    }
    if let Some(d) = digits.get(1) {
        cents += i64::from(*d);
    }
    // Round half up on the third decimal
    if digits.get(2).map(|d| *d >= 5).unwrap_or(false) {
        cents += 1;
    }

    let minor = whole.checked_mul(100)?.checked_add(cents)?;
    Some(Amount::from_minor(if negative { -minor } else { minor }))
}

/// Parse a date in any of the formats the CRM renders
///
/// Numeric dates are read day-first (`03-04-2025` is 3 April).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_end_matches('.').replace(',', "");
    const FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%d %b %Y", "%d %B %Y", "%d-%b-%Y",
        "%d-%B-%Y",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&s, fmt).ok())
}

/// First date-looking substring of `text`, parsed
pub fn find_date(text: &str) -> Option<NaiveDate> {
    date_re()
        .find_iter(text)
        .find_map(|m| parse_date(m.as_str()))
}

/// Find a document number such as `INV-000123` or `PRO-2025-0042`
///
/// The prefix is matched case-insensitively and may be followed by `-`, `#`
/// or `/`. The result is normalised to `PREFIX-digits` using the prefix as
/// given.
pub fn document_number(text: &str, prefixes: &[&str]) -> Option<String> {
    prefixes.iter().find_map(|prefix| {
        let re = Regex::new(&format!(
            r"(?i)\b{}\s*[-#/]?\s*((?:\d{{4}}[-/])?\d{{3,}})\b",
            regex::escape(prefix)
        ))
        .ok()?;
        re.captures(text)
            .map(|caps| format!("{}-{}", prefix, &caps[1]))
    })
}

/// Value following `label` on the same line, or on the next non-empty line
/// when the label stands alone (e.g. a table header cell)
pub fn labeled_value(text: &str, label: &str) -> Option<String> {
    find_labeled(text, label, |_| true)
}

fn find_labeled<F>(text: &str, label: &str, accept: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let re = Regex::new(&format!(r"(?i)(?:^|[^\w]){}\b\s*[:#]?", regex::escape(label))).ok()?;

    for m in re.find_iter(text) {
        // The match may begin with the separator preceding the label
        let matched = m.as_str();
        let lead = matched.len() - matched.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
        let label_start = m.start() + lead;
        let line_start = text[..label_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        if !accept(&text[line_start..label_start]) {
            continue;
        }

        let rest = &text[m.end()..];
        let mut lines = rest.split('\n');
        let same_line = first_cell(lines.next().unwrap_or(""));
        if !same_line.is_empty() {
            return Some(same_line);
        }
        if let Some(next) = lines.map(first_cell).find(|l| !l.is_empty()) {
            return Some(next);
        }
    }
    None
}

/// First tab- or wide-space-separated cell, trimmed of separators
fn first_cell(s: &str) -> String {
    let s = s.trim_start_matches(|c: char| c == ':' || c == '#' || c.is_whitespace());
    let end = s
        .find('\t')
        .into_iter()
        .chain(s.find("   "))
        .min()
        .unwrap_or(s.len());
    s[..end].trim().to_string()
}

pub fn labeled_date(text: &str, label: &str) -> Option<NaiveDate> {
    labeled_value(text, label).and_then(|v| find_date(&v))
}

pub fn labeled_amount(text: &str, label: &str) -> Option<Amount> {
    labeled_value(text, label).and_then(|v| parse_amount(&v))
}

/// Document total: "Grand Total" if present, otherwise "Total", never "Sub Total"
pub fn total(text: &str) -> Option<Amount> {
    find_labeled(text, "Grand Total", |_| true)
        .and_then(|v| parse_amount(&v))
        .or_else(|| {
            find_labeled(text, "Total", |before| {
                let before = before.trim_end().to_lowercase();
                !(before.ends_with("sub") || before.ends_with("grand"))
            })
            .and_then(|v| parse_amount(&v))
        })
}

/// Status badge text (`Paid`, `Unpaid`, ...)
///
/// Prefers a line consisting solely of a known status, then a `Status:` label.
pub fn status(text: &str) -> Option<String> {
    for line in text.lines().map(str::trim) {
        if let Some(known) = STATUSES.iter().find(|s| s.eq_ignore_ascii_case(line)) {
            return Some(known.to_string());
        }
    }
    labeled_value(text, "Status").map(|v| {
        STATUSES
            .iter()
            .find(|s| v.to_lowercase().starts_with(&s.to_lowercase()))
            .map(|s| s.to_string())
            .unwrap_or(v)
    })
}

/// Numeric id following a path segment, e.g. `leads/index` in
/// `/admin/leads/index/42` -> `42`
pub fn id_from_url(url: &str, segment: &str) -> Option<u64> {
    let segment = segment.trim_matches('/');
    let re = Regex::new(&format!(r"/{}/(\d+)(?:[/?#]|$)", regex::escape(segment))).ok()?;
    re.captures(url).and_then(|caps| caps[1].parse().ok())
}

/// Collapse HTML to roughly what `innerText` would give
pub fn strip_tags(html: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static CELLS: OnceLock<Regex> = OnceLock::new();
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)>").expect("blocks regex")
    });
    let cells = CELLS.get_or_init(|| Regex::new(r"(?i)</t[dh]>").expect("cells regex"));
    let breaks = BREAKS.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(p|div|tr|li|h[1-6]|table|thead|tbody)>")
            .expect("breaks regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tags regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"[ \r\f\x0B]+").expect("spaces regex"));

    let text = blocks.replace_all(html, "");
    let text = cells.replace_all(&text, "\t");
    let text = breaks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = spaces.replace_all(&text, " ");

    text.lines()
        .map(|l| l.trim_matches(' '))
        .map(|l| l.trim_end_matches('\t'))
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#8377;", "₹")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Words that turn a bare "Date" label into some other date
const QUALIFIED_DATES: &[&str] = &["due", "expiry", "valid", "payment", "open", "last"];

/// Document number alone on its line, with the byte offset of that line
fn heading_number(text: &str, prefixes: &[&str]) -> Option<(String, usize)> {
    let mut offset = 0;
    for line in text.split('\n') {
        let at = offset;
        offset += line.len() + 1;
        if line.contains('\t') {
            continue;
        }
        if let Some(number) = document_number(line, prefixes) {
            return Some((number, at));
        }
    }
    None
}

/// Header fields shared by proposals, proformas and invoices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub number: Option<String>,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total: Option<Amount>,
    pub amount_due: Option<Amount>,
    pub status: Option<String>,
}

impl DocumentSummary {
    /// Read the header fields of one document
    ///
    /// `text` should be the document's own panel. When it is the whole page
    /// of a split list/preview view, the number standing on a line of its own
    /// (the preview heading) wins over numbers inside tab-separated list rows,
    /// and the status is taken from below that heading.
    pub fn from_text(text: &str, prefixes: &[&str]) -> Self {
        let first = |labels: &[&str]| labels.iter().find_map(|l| labeled_date(text, l));
        let (number, heading_at) = match heading_number(text, prefixes) {
            Some((number, at)) => (Some(number), at),
            None => (document_number(text, prefixes), 0),
        };

        Self {
            number,
            date: first(&["Invoice Date", "Proforma Date", "Proposal Date"]).or_else(|| {
                find_labeled(text, "Date", |before| {
                    let before = before.trim_end().to_lowercase();
                    !QUALIFIED_DATES.iter().any(|q| before.ends_with(q))
                })
                .and_then(|v| find_date(&v))
            }),
            due_date: first(&["Due Date", "Expiry Date", "Open Till", "Valid Till"]),
            total: total(text),
            amount_due: ["Amount Due", "Balance Due", "Total Due"]
                .iter()
                .find_map(|l| labeled_amount(text, l)),
            status: status(&text[heading_at..]).or_else(|| status(text)),
        }
    }

    pub fn require_number(&self, what: &str) -> crate::error::Result<String> {
        self.number
            .clone()
            .ok_or_else(|| crate::error::WorkflowError::extraction(what, "no document number on page"))
    }

    pub fn require_total(&self, what: &str) -> crate::error::Result<Amount> {
        self.total
            .ok_or_else(|| crate::error::WorkflowError::extraction(what, "no total on page"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE_TEXT: &str = "INVOICE\nINV-000123\nUnpaid\nBill To\tAcme Traders Pvt Ltd\n\
Invoice Date: 05-03-2025\nDue Date: 04-04-2025\n\
#\tItem\tQty\tRate\tAmount\n1\tAnnual maintenance\t2\t₹ 1,250.00\t₹ 2,500.00\n\
Sub Total\t₹ 2,500.00\nTax (18%)\t₹ 450.00\nTotal\t₹ 2,950.00\n\
Total Paid\t(₹ 1,000.00)\nAmount Due\t₹ 1,950.00";

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("₹ 1,250.00"), Some(Amount::from_minor(125_000)));
        assert_eq!(parse_amount("Rs. 1,23,456.5"), Some(Amount::from_minor(12_345_650)));
        assert_eq!(parse_amount("$12"), Some(Amount::from_major(12)));
        assert_eq!(parse_amount("INR 99.999"), Some(Amount::from_minor(10_000)));
        assert_eq!(parse_amount("-₹ 5.10"), Some(Amount::from_minor(-510)));
        assert_eq!(parse_amount("(₹ 1,000.00)"), Some(Amount::from_minor(-100_000)));
        assert_eq!(parse_amount("no money here"), None);
    }

    #[test]
    fn test_parse_amount_bare_fraction() {
        assert_eq!(parse_amount(".50"), Some(Amount::from_minor(50)));
        assert_eq!(parse_amount("₹ .5"), Some(Amount::from_minor(50)));
        assert_eq!(parse_amount("(.75)"), Some(Amount::from_minor(-75)));
        assert_eq!(parse_amount("0.50"), Some(Amount::from_minor(50)));
    }

    #[test]
    fn test_amount_arithmetic_saturates() {
        assert_eq!(Amount::from_major(i64::MAX).minor(), i64::MAX);
        assert_eq!(Amount::from_major(i64::MIN).minor(), i64::MIN);
        assert_eq!(Amount::from_minor(i64::MAX).times(2).minor(), i64::MAX);
        assert_eq!(Amount::from_minor(-250).times(3), Amount::from_minor(-750));
        assert_eq!(Amount::from_major(12).times(0), Amount::ZERO);
    }

    #[test]
    fn test_amount_display_and_serde() {
        let amount = Amount::from_minor(-1205);
        assert_eq!(amount.to_string(), "-12.05");
        assert_eq!(Amount::from_minor(7).to_string(), "0.07");

        let json = serde_json::to_string(&Amount::from_minor(295_000)).unwrap();
        assert_eq!(json, "\"2950.00\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount::from_minor(295_000));
        assert!(serde_json::from_str::<Amount>("\"abc\"").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        for input in [
            "2025-03-05",
            "05-03-2025",
            "05/03/2025",
            "05.03.2025",
            "5 Mar 2025",
            "05 March, 2025",
        ] {
            assert_eq!(parse_date(input), Some(expected), "input {}", input);
        }
        assert_eq!(parse_date("31-02-2025"), None);
        assert_eq!(find_date("Valid till 15/08/2025 only"), NaiveDate::from_ymd_opt(2025, 8, 15));
    }

    #[test]
    fn test_document_number() {
        assert_eq!(
            document_number(INVOICE_TEXT, &["INV"]),
            Some("INV-000123".to_string())
        );
        assert_eq!(
            document_number("Proforma # pf/2025/0042 created", &["PF"]),
            Some("PF-2025/0042".to_string())
        );
        assert_eq!(
            document_number("Proposal PRO-000007", &["INV", "PRO"]),
            Some("PRO-000007".to_string())
        );
        // Too few digits is not a document number
        assert_eq!(document_number("INV-12", &["INV"]), None);
        // Prefix must be a whole word
        assert_eq!(document_number("PREINV-000001", &["INV"]), None);
    }

    #[test]
    fn test_labeled_values() {
        assert_eq!(
            labeled_value(INVOICE_TEXT, "Bill To"),
            Some("Acme Traders Pvt Ltd".to_string())
        );
        assert_eq!(
            labeled_date(INVOICE_TEXT, "Invoice Date"),
            NaiveDate::from_ymd_opt(2025, 3, 5)
        );
        assert_eq!(
            labeled_date(INVOICE_TEXT, "Due Date"),
            NaiveDate::from_ymd_opt(2025, 4, 4)
        );
        assert_eq!(
            labeled_amount(INVOICE_TEXT, "Amount Due"),
            Some(Amount::from_minor(195_000))
        );
        // Header cell with the value on the following line
        assert_eq!(
            labeled_value("Payment Mode\n\n  Bank Transfer\n", "Payment Mode"),
            Some("Bank Transfer".to_string())
        );
        assert_eq!(labeled_value(INVOICE_TEXT, "Shipping"), None);
    }

    #[test]
    fn test_total_skips_sub_total() {
        assert_eq!(total(INVOICE_TEXT), Some(Amount::from_minor(295_000)));
        assert_eq!(
            total("Sub Total: 100.00\nGrand Total: 118.00\nTotal: 1.00"),
            Some(Amount::from_minor(11_800))
        );
        assert_eq!(total("SubTotal 10.00"), None);
    }

    #[test]
    fn test_status() {
        assert_eq!(status(INVOICE_TEXT), Some("Unpaid".to_string()));
        assert_eq!(status("x\nStatus: partially paid\n"), Some("Partially Paid".to_string()));
        assert_eq!(status("nothing"), None);
    }

    #[test]
    fn test_id_from_url() {
        assert_eq!(
            id_from_url("https://crm.test/admin/leads/index/42", "leads/index"),
            Some(42)
        );
        assert_eq!(
            id_from_url("https://crm.test/admin/clients/client/7?group=profile", "/clients/client/"),
            Some(7)
        );
        assert_eq!(
            id_from_url("https://crm.test/admin/invoices/list_invoices/15#15", "list_invoices"),
            Some(15)
        );
        assert_eq!(id_from_url("https://crm.test/admin/leads", "leads/index"), None);
    }

    #[test]
    fn test_strip_tags() {
        let html = "<html><head><title>x</title></head><body><script>var a=1;</script>\
<h4>INV-000123</h4><table><tr><td>Total</td><td>&#8377;&nbsp;2,950.00</td></tr></table>\
<p>Terms &amp; Conditions</p></body></html>";
        let text = strip_tags(html);
        assert!(!text.contains("var a"));
        assert!(text.contains("INV-000123"));
        assert!(text.contains("Terms & Conditions"));
        assert_eq!(total(&text), Some(Amount::from_minor(295_000)));
    }

    #[test]
    fn test_document_summary() {
        let summary = DocumentSummary::from_text(INVOICE_TEXT, &["INV"]);
        assert_eq!(summary.number.as_deref(), Some("INV-000123"));
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2025, 3, 5));
        assert_eq!(summary.due_date, NaiveDate::from_ymd_opt(2025, 4, 4));
        assert_eq!(summary.total, Some(Amount::from_minor(295_000)));
        assert_eq!(summary.amount_due, Some(Amount::from_minor(195_000)));
        assert_eq!(summary.status.as_deref(), Some("Unpaid"));
        assert!(summary.require_number("invoice number").is_ok());

        let empty = DocumentSummary::from_text("", &["INV"]);
        assert!(empty.require_total("invoice total").is_err());
    }

    #[test]
    fn test_document_summary_on_split_view() {
        // List of other invoices renders ahead of the open one
        let text = "Invoices\nINV-000041\tAcme\t₹ 500.00\nPaid\nINV-000042\nUnpaid\n\
Invoice Date: 05-03-2025\nTotal\t₹ 2,950.00";
        let summary = DocumentSummary::from_text(text, &["INV"]);
        assert_eq!(summary.number.as_deref(), Some("INV-000042"));
        assert_eq!(summary.status.as_deref(), Some("Unpaid"));
        assert_eq!(summary.total, Some(Amount::from_minor(295_000)));
    }

    #[test]
    fn test_bare_date_label_skips_due_date() {
        let summary =
            DocumentSummary::from_text("PF-000123\nDue Date: 04-04-2025\nDate: 05-03-2025", &["PF"]);
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2025, 3, 5));
        assert_eq!(summary.due_date, NaiveDate::from_ymd_opt(2025, 4, 4));

        let summary = DocumentSummary::from_text("PRO-000007\nExpiry Date: 12-03-2025", &["PRO"]);
        assert_eq!(summary.date, None);
    }
}
