//! Capability routing - the planner's fallback path

use std::collections::{HashMap, HashSet};

/// Infer required capabilities from a prompt
///
/// Lowercase substring match of each configured keyword against the prompt;
/// returns the deduplicated capabilities in keyword-sorted order for
/// determinism.
pub fn infer_capabilities(prompt: &str, keyword_map: &HashMap<String, String>) -> Vec<String> {
    let prompt = prompt.to_lowercase();
    let mut keywords: Vec<(&String, &String)> = keyword_map.iter().collect();
    keywords.sort_by_key(|(kw, _)| kw.as_str());

    let mut seen = HashSet::new();
    let mut capabilities = Vec::new();
    for (keyword, capability) in keywords {
        if prompt.contains(keyword.as_str()) && seen.insert(capability.clone()) {
            capabilities.push(capability.clone());
        }
    }
    capabilities
}

/// Greedy set cover over pack capabilities
///
/// Repeatedly picks the pack covering the most still-uncovered required
/// capabilities; ties break by declaration order. Stops when everything is
/// covered or no pack adds coverage.
pub fn greedy_set_cover(required: &[String], packs: &[(String, Vec<String>)]) -> Vec<String> {
    let mut uncovered: HashSet<&str> = required.iter().map(String::as_str).collect();
    let mut chosen = Vec::new();

    while !uncovered.is_empty() {
        let mut best: Option<(usize, usize)> = None; // (pack index, covered count)
        for (idx, (id, capabilities)) in packs.iter().enumerate() {
            if chosen.contains(id) {
                continue;
            }
            let covers = capabilities.iter().filter(|c| uncovered.contains(c.as_str())).count();
            if covers > 0 && best.is_none_or(|(_, best_covers)| covers > best_covers) {
                best = Some((idx, covers));
            }
        }

        let Some((idx, _)) = best else { break };
        let (id, capabilities) = &packs[idx];
        for capability in capabilities {
            uncovered.remove(capability.as_str());
        }
        chosen.push(id.clone());
    }

    chosen
}

/// Score each pack by summed keyword occurrences in the prompt
///
/// Ties (including all-zero) resolve to the earliest declared pack. Returns
/// None only when no packs exist.
pub fn keyword_score(prompt: &str, packs: &[(String, Vec<String>)]) -> Option<String> {
    let prompt = prompt.to_lowercase();
    let mut best: Option<(&String, usize)> = None;
    for (id, keywords) in packs {
        let score: usize = keywords.iter().map(|k| prompt.matches(k.to_lowercase().as_str()).count()).sum();
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((id, score));
        }
    }
    best.map(|(id, _)| id.clone())
}
