use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// How two divergent texts are merged
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// blend
    Blend,
    /// restyle
    Restyle,
    /// bridge
    Bridge,
}

/// Unknown merge strategy {0:?}
#[derive(Debug, Error, Display)]
pub struct UnknownStrategy(String);

impl FromStr for MergeStrategy {
    type Err = UnknownStrategy;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blend" | "mix" => Ok(Self::Blend),
            "restyle" | "action_b_tone_a" => Ok(Self::Restyle),
            "bridge" | "append" => Ok(Self::Bridge),
            _ => Err(UnknownStrategy(s.to_owned())),
        }
    }
}

const OUTPUT_RULE: &str = "Return only the resulting text, without markdown, headings or commentary.";

/// The instruction payload for the text-transform service
///
/// Version A is the current draft and version B the incoming checkpoint. The
/// payload only depends on its inputs.
pub fn instructions(strategy: MergeStrategy, current: &str, incoming: &str) -> String {
    let (task, rules, label_a, label_b) = match strategy {
        MergeStrategy::Blend => (
            "Merge two drafts of the same passage into one version.",
            [
                "Keep the vocabulary, sentence rhythm and tone of version A.",
                "Where the two versions disagree on facts or actions, version B wins.",
                "Where A describes a state that B contradicts, write the change from one state to the other as a transition in the story instead of keeping both.",
                "Interleave the material, do not place B after A.",
            ],
            "Version A (current draft)",
            "Version B (incoming checkpoint)",
        ),
        MergeStrategy::Restyle => (
            "Rewrite version B in the voice of version A.",
            [
                "Take the facts, events and data from version B only.",
                "Take sentence length, vocabulary and emotional register from version A only.",
                "Do not add facts from version A that are not in version B.",
                "Keep the order in which version B presents its facts.",
            ],
            "Version A (style reference)",
            "Version B (content source)",
        ),
        MergeStrategy::Bridge => (
            "Append version B to the end of version A.",
            [
                "Keep the text of version A first and the text of version B second, both unchanged.",
                "If the end of A and the start of B do not connect in time, place or logic, insert one or two connecting sentences between them.",
                "If they already connect, insert nothing.",
                "Return the complete combined text.",
            ],
            "Part 1 (version A)",
            "Part 2 (version B)",
        ),
    };

    let mut out = String::new();
    out.push_str(task);
    out.push_str("\n\nRules:\n");
    for (i, rule) in rules.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, rule));
    }
    out.push_str(&format!("\n[{}]:\n\"\"\"\n{}\n\"\"\"\n", label_a, current));
    out.push_str(&format!("\n[{}]:\n\"\"\"\n{}\n\"\"\"\n", label_b, incoming));
    out.push('\n');
    out.push_str(OUTPUT_RULE);
    out
}
