// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan explanation
//!
//! Renders a plan graph as text for debugging: one line per step with its
//! dependencies, dedup alias and frozen load options.

use std::fmt::Write;

use super::graph::PlanGraph;

impl PlanGraph {
    /// Format the plan one step per line
    pub fn explain(&self) -> String {
        let mut output = String::new();
        for id in self.step_ids() {
            let Ok(step) = self.get_step(id) else {
                continue;
            };

            let deps = self
                .dependencies(id)
                .map(|deps| {
                    deps.iter()
                        .map(|d| d.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();

            let _ = write!(output, "{} {} <- [{}]", id, step.label(), deps);
            if let Some(survivor) = self.replaced_by(id) {
                let _ = write!(output, " => {}", survivor);
            }
            if let Some(options_key) = step.options_key() {
                let _ = write!(output, " options={}", options_key);
            }
            output.push('\n');
        }
        output
    }
}
