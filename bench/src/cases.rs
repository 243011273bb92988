//! Test-case suite: which payloads get measured and how their content is produced.

use base64::Engine as _;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use gasbench_types::{PayloadFormat, PayloadRule, TestCase};

const FILLER: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
/// Two-, three- and four-byte code points, cycled for the UTF-8 format case.
const MULTIBYTE: [char; 6] = ['é', '中', '😀', 'ß', 'Ж', '€'];
const PAYLOAD_SEED: u64 = 0x6761_7362_656e_6368;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SuiteSelection {
    All,
    Characters,
    Lengths,
    Formats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub selection: SuiteSelection,
    pub characters: Vec<char>,
    pub lengths: Vec<usize>,
    pub formats: Vec<PayloadFormat>,
    pub format_base_length: usize,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            selection: SuiteSelection::All,
            characters: vec!['a', 'Z', '0', '!', ' ', 'é', '中', '😀'],
            lengths: vec![1, 10, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000],
            formats: PayloadFormat::ALL.to_vec(),
            format_base_length: 100,
        }
    }
}

/// Ordered suite: characters, then lengths, then formats.
pub fn build_suite(cfg: &SuiteConfig) -> Vec<TestCase> {
    let want = |s: SuiteSelection| cfg.selection == SuiteSelection::All || cfg.selection == s;
    let mut cases = Vec::new();
    if want(SuiteSelection::Characters) {
        cases.extend(cfg.characters.iter().map(|&c| TestCase::character(c)));
    }
    if want(SuiteSelection::Lengths) {
        cases.extend(cfg.lengths.iter().map(|&n| TestCase::fixed(n)));
    }
    if want(SuiteSelection::Formats) {
        cases.extend(cfg.formats.iter().map(|&f| TestCase::format(f, cfg.format_base_length)));
    }
    cases
}

/// Content for a case. Deterministic: the same rule always renders the same string.
pub fn render_payload(rule: &PayloadRule) -> String {
    match rule {
        PayloadRule::Character(c) => c.to_string(),
        PayloadRule::Fixed { length } => filler(*length),
        PayloadRule::Format { format, base_length } => render_format(*format, *base_length),
    }
}

fn filler(length: usize) -> String {
    FILLER.iter().cycle().take(length).map(|&b| b as char).collect()
}

fn seeded_bytes(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(PAYLOAD_SEED ^ len as u64);
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}

fn render_format(format: PayloadFormat, base_length: usize) -> String {
    match format {
        PayloadFormat::Json => {
            // `{"data":""}` is 11 bytes; pad the string so the document hits base_length
            let overhead = serde_json::json!({ "data": "" }).to_string().len();
            let data = filler(base_length.saturating_sub(overhead));
            serde_json::json!({ "data": data }).to_string()
        }
        PayloadFormat::Base64 => {
            base64::engine::general_purpose::STANDARD.encode(seeded_bytes(base_length))
        }
        PayloadFormat::Hex => hex::encode(seeded_bytes(base_length)),
        PayloadFormat::Utf8 => {
            let mut out = String::new();
            for c in MULTIBYTE.iter().cycle() {
                if out.len() + c.len_utf8() > base_length {
                    break;
                }
                out.push(*c);
            }
            out
        }
    }
}
