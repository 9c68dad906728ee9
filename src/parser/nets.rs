//! Nets-table parser.
//!
//! The device's `print_nets()` listing is a tab-delimited table with two
//! sub-grammars, switched by the header line:
//!
//! ```text
//! Index   Name            Voltage     Nodes
//! 1        GND             0 V         GND,9
//! 4        DAC 0           3.33 V      DAC_0,BUF_IN
//! Index   Name            Color       Nodes          ADC / GPIO
//! 8        Net 8           pink        6,5
//! 11       Net 11          cyan        ADC_3,20      -2.78 V
//! 12       Net 12          * red    - f  GP_1,25     input - floating
//! ```
//!
//! A header containing `Color` switches all following records to the color
//! grammar until the next header. Color cells may be preceded by backspace
//! control characters and a `*` marker (the device redraws highlighted
//! rows in place), and may be followed by a `- <letter>` flag token for
//! floating/high GPIO annotations. Text after the first tab in the color
//! grammar's remainder is auxiliary ADC/GPIO data, stored verbatim.
//!
//! The device re-sends or redraws its table mid-stream; a record whose
//! index is not strictly greater than the last successfully parsed index is
//! the start of such a duplicate and is dropped without error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{aggregate, AggregateError, LineError};

/// Color names the device prints, in match order.
pub const NAMED_COLORS: [&str; 18] = [
    "red",
    "orange",
    "amber",
    "yellow",
    "chartreuse",
    "green",
    "seafoam",
    "cyan",
    "blue",
    "royal blue",
    "indigo",
    "violet",
    "purple",
    "pink",
    "magenta",
    "white",
    "black",
    "grey",
];

/// Flag token between the color and the node list, e.g. `- f` or `- h`.
static FLAG_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^- [A-Za-z]").expect("flag pattern must compile"));

/// One circuit net reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Net {
    /// Net index; strictly increasing within one table.
    pub index: i32,
    /// Net name, e.g. `GND` or `Net 8`.
    pub name: String,
    /// Voltage with `V` suffix; present in the voltage grammar only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<String>,
    /// Color name; present in the color grammar only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Member nodes of the net.
    pub nodes: Vec<String>,
    /// Auxiliary ADC/GPIO column, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
}

enum LineFailure {
    /// Index not strictly greater than the watermark: the device started
    /// re-sending the table. Dropped silently.
    Stale,
    Invalid(String),
}

/// Parse a `print_nets()` table.
///
/// Returns every net that parsed, plus an [`AggregateError`] describing the
/// lines that did not. Records from re-sent/redrawn table fragments are
/// dropped silently rather than reported.
pub fn parse_nets(text: &str) -> (Vec<Net>, Option<AggregateError>) {
    let mut nets = Vec::new();
    let mut errors = Vec::new();
    let mut has_color = false;
    let mut watermark = 0i32;

    for line in text.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("Index") {
            has_color = trimmed.contains("Color");
            continue;
        }

        match parse_net_line(trimmed, has_color, watermark) {
            Ok(net) => {
                watermark = net.index;
                nets.push(net);
            }
            Err(LineFailure::Stale) => {}
            Err(LineFailure::Invalid(reason)) => errors.push(LineError::new(trimmed, reason)),
        }
    }

    (nets, aggregate(errors))
}

fn parse_net_line(line: &str, has_color: bool, watermark: i32) -> Result<Net, LineFailure> {
    let fields: Vec<&str> = line.splitn(3, '\t').collect();
    if fields.len() < 3 {
        return Err(LineFailure::Invalid(format!(
            "expected at least 3 tab-separated fields, got {}",
            fields.len()
        )));
    }

    let index: i32 = fields[0]
        .trim()
        .parse()
        .map_err(|_| LineFailure::Invalid(format!("unable to parse index {:?}", fields[0].trim())))?;

    if index <= watermark {
        return Err(LineFailure::Stale);
    }

    let name = fields[1].trim().to_string();
    let rest = fields[2].trim();

    let mut voltage = None;
    let mut color = None;
    let mut extra_data = None;
    let nodes_part;

    if !has_color {
        // e.g. "0 V         GND,9" or "3.33 V      DAC_0,BUF_IN"
        let Some((before, after)) = rest.split_once(" V") else {
            return Err(LineFailure::Invalid("unable to find voltage".to_string()));
        };
        voltage = Some(format!("{}V", before.trim()));
        nodes_part = after.trim();
    } else {
        // e.g. "pink        6,5" or "\u{8}\u{8}* red    - f  GP_1,25   \t    input - floating"
        let rest = rest.trim_start_matches('\u{8}');
        let rest = rest.strip_prefix('*').unwrap_or(rest).trim();

        let Some(color_name) = NAMED_COLORS.iter().find(|c| rest.starts_with(**c)) else {
            return Err(LineFailure::Invalid("unable to find color".to_string()));
        };
        color = Some((*color_name).to_string());
        let mut rest = rest[color_name.len()..].trim();

        if let Some(m) = FLAG_TOKEN.find(rest) {
            rest = rest[m.end()..].trim();
        }

        match rest.split_once('\t') {
            Some((before, after)) => {
                nodes_part = before.trim();
                extra_data = Some(after.trim().to_string());
            }
            None => nodes_part = rest,
        }
    }

    let nodes = nodes_part
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Net {
        index,
        name,
        voltage,
        color,
        nodes,
        extra_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_voltage_table() {
        let text = "Index\tName\t\tVoltage\t\tNodes\n\
                    \r1\t GND\t\t 0 V         GND\t    \n\
                    2\t Top Rail\t 0.00 V      TOP_R\t    \n\
                    3\t Bottom Rail\t 0.00 V      BOT_R\t    \n\
                    4\t DAC 0\t\t 3.33 V      DAC_0,BUF_IN\t    \n\
                    5\t DAC 1\t\t 0.00 V      DAC_1\t    \n";

        let (nets, err) = parse_nets(text);
        assert!(err.is_none(), "unexpected errors: {err:?}");
        assert_eq!(nets.len(), 5);

        assert_eq!(nets[0].index, 1);
        assert_eq!(nets[0].name, "GND");
        assert_eq!(nets[0].voltage.as_deref(), Some("0V"));
        assert_eq!(nets[0].nodes, vec!["GND"]);

        assert_eq!(nets[3].index, 4);
        assert_eq!(nets[3].name, "DAC 0");
        assert_eq!(nets[3].voltage.as_deref(), Some("3.33V"));
        assert_eq!(nets[3].nodes, vec!["DAC_0", "BUF_IN"]);
    }

    #[test]
    fn drops_duplicate_index_without_error() {
        let text = "Index\tA\n1\tGND\t0 V\tGND\n1\tGND\t0 V\tGND\n2\tNet2\t1 V\tN2\n";
        let (nets, err) = parse_nets(text);
        assert!(err.is_none(), "duplicate index must not be an error: {err:?}");
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].index, 1);
        assert_eq!(nets[1].index, 2);
    }

    #[test]
    fn drops_redrawn_table_fragment() {
        let text = "Index\tName\tVoltage\n\
                    1\tGND\t 0 V  GND\n\
                    2\tNet 2\t 1 V  N2\n\
                    1\tGND\t 0 V  GND\n\
                    2\tNet 2\t 1 V  N2\n";
        let (nets, err) = parse_nets(text);
        assert!(err.is_none());
        assert_eq!(nets.len(), 2);
    }

    #[test]
    fn color_mode_toggles_on_headers() {
        let text = "Index\tName\t\tVoltage\t    Nodes\n\
                    1\t GND\t\t 0 V         GND,9\n\
                    Index\tName\t\tColor\t    Nodes          ADC / GPIO\n\
                    8\t Net 8\t\t pink        6,5\n\
                    9\t Net 9\t\t indigo      A3,13\n";

        let (nets, err) = parse_nets(text);
        assert!(err.is_none(), "unexpected errors: {err:?}");
        assert_eq!(nets.len(), 3);
        assert_eq!(nets[0].voltage.as_deref(), Some("0V"));
        assert!(nets[0].color.is_none());
        assert_eq!(nets[1].color.as_deref(), Some("pink"));
        assert!(nets[1].voltage.is_none());
        assert_eq!(nets[1].nodes, vec!["6", "5"]);
        assert_eq!(nets[2].color.as_deref(), Some("indigo"));
    }

    #[test]
    fn color_line_with_auxiliary_data() {
        let text = "Index\tName\t\tColor\t    Nodes          ADC / GPIO\n\
                    11\t Net 11\t\t royal blue  ADC_3,20  \t    \u{8}-6.69 V\n";

        let (nets, err) = parse_nets(text);
        assert!(err.is_none(), "unexpected errors: {err:?}");
        assert_eq!(nets[0].color.as_deref(), Some("royal blue"));
        assert_eq!(nets[0].nodes, vec!["ADC_3", "20"]);
        assert_eq!(nets[0].extra_data.as_deref(), Some("\u{8}-6.69 V"));
    }

    #[test]
    fn color_line_with_backspaces_marker_and_flag() {
        let text = "Index\tName\t\tColor\t    Nodes          ADC / GPIO\n\
                    12\t Net 12\t\t \u{8}\u{8}* red    - f  GP_1,25   \t    input - floating\n\
                    13\t Net 13\t\t \u{8}\u{8}* red    - h  GP_4,36   \t    output - high\n";

        let (nets, err) = parse_nets(text);
        assert!(err.is_none(), "unexpected errors: {err:?}");
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].color.as_deref(), Some("red"));
        assert_eq!(nets[0].nodes, vec!["GP_1", "25"]);
        assert_eq!(nets[0].extra_data.as_deref(), Some("input - floating"));
        assert_eq!(nets[1].nodes, vec!["GP_4", "36"]);
        assert_eq!(nets[1].extra_data.as_deref(), Some("output - high"));
    }

    #[test]
    fn too_few_fields_is_an_error() {
        let (nets, err) = parse_nets("1\t GND\n");
        assert!(nets.is_empty());
        let err = err.expect("expected an aggregate error");
        assert_eq!(err.errors.len(), 1);
        assert!(err.errors[0].reason.contains("3 tab-separated fields"));
    }

    #[test]
    fn bad_index_is_an_error() {
        let (nets, err) = parse_nets("invalid\t GND\t\t 0 V  GND\n");
        assert!(nets.is_empty());
        assert!(err.expect("error").errors[0].reason.contains("index"));
    }

    #[test]
    fn missing_voltage_marker_is_an_error() {
        let (nets, err) = parse_nets("1\t GND\t\t 0 X         GND\n");
        assert!(nets.is_empty());
        assert!(err.expect("error").errors[0]
            .reason
            .contains("unable to find voltage"));
    }

    #[test]
    fn unknown_color_is_an_error() {
        let text = "Index\tName\tColor\n6\t Net 6\t mauve  A1,A2\n";
        let (nets, err) = parse_nets(text);
        assert!(nets.is_empty());
        assert!(err.expect("error").errors[0]
            .reason
            .contains("unable to find color"));
    }

    #[test]
    fn errors_do_not_discard_good_records() {
        let text = "Index\tName\tVoltage\n\
                    1\tGND\t 0 V  GND\n\
                    broken line\n\
                    2\tNet 2\t 1 V  N2\n";
        let (nets, err) = parse_nets(text);
        assert_eq!(nets.len(), 2);
        assert_eq!(err.expect("error").errors.len(), 1);
    }

    #[test]
    fn empty_node_tokens_are_dropped() {
        let (nets, err) = parse_nets("1\t GND\t\t 0 V         \t    \n");
        assert!(err.is_none());
        assert!(nets[0].nodes.is_empty());

        let (nets, _) = parse_nets("4\t DAC 0\t\t 3.33 V      DAC_0 , BUF_IN \t    \n");
        assert_eq!(nets[0].nodes, vec!["DAC_0", "BUF_IN"]);
    }
}
