// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `doppel check-config` command implementation.

use std::fmt::Write;

use doppel_config::DoppelConfig;

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Render the effective configuration as a short human-readable report.
pub fn summarize(config: &DoppelConfig) -> String {
    let mut out = String::new();
    let burst = &config.burst;
    let persona = &config.persona;
    let relationship = &config.relationship;

    // Writing to a String cannot fail.
    let _ = writeln!(out, "config ok (agent.name={})", config.agent.name);
    let _ = writeln!(out, "  database: {}", config.storage.database_path);
    let _ = writeln!(
        out,
        "  bursts: {} (gap {}s, inactivity {}s, max {} parts / {} chars)",
        on_off(burst.enabled),
        burst.gap_secs,
        burst.inactivity_secs,
        burst.max_parts,
        burst.max_chars,
    );
    let _ = writeln!(
        out,
        "  carryover: max age {}s, store threshold {} tokens",
        burst.carryover_max_age_secs, config.storage.min_tokens_to_store,
    );
    let _ = writeln!(
        out,
        "  persona: {} (min {} pending, cooldown {}h)",
        on_off(persona.enabled),
        persona.min_pending,
        persona.cooldown_hours,
    );
    let _ = writeln!(
        out,
        "  relationship: {} (min {} pending, cooldown {}h)",
        on_off(relationship.enabled),
        relationship.min_pending,
        relationship.cooldown_hours,
    );
    out
}
