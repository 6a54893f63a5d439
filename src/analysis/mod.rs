//! Dependency Analyzer (spec §4.4)
//!
//! For each assignment across the sections selected for a given execution
//! mode, collects the identifiers it references, subtracts built-in
//! function names, user-function names, parameter names, and reserved
//! environment names, and classifies every function call reachable from
//! the expression as stateful / non-concurrent / parallel-list-capable /
//! plain. The remainder is `DependencyInfo`, one per assignment.

use crate::ast::{Expr, Script, SectionKind};
use crate::eval::builtins::{builtin_concurrency, BuiltinConcurrency};
use indexmap::IndexSet;
use std::collections::HashSet;

/// Reserved environment names seeded by the executor from context (spec
/// §4.8 step 3): black point, solar angles, carrington rotation, detected
/// wavelength/dispersion.
pub const RESERVED_ENV_NAMES: &[&str] = &["black_point", "solar_p_angle", "solar_b0", "carrington_rotation", "detected_wavelength", "detected_dispersion"];

#[derive(Debug, Clone, Default)]
pub struct DependencyInfo {
    pub var_name: String,
    pub dependencies: IndexSet<String>,
    pub has_function_call: bool,
    pub has_stateful_function: bool,
    pub has_non_concurrent_function: bool,
    pub has_parallel_function_arguments: bool,
    pub expr: Expr,
    pub expr_text: String,
    pub section_kind: SectionKind,
    pub section_name: String,
}

/// Builds one `DependencyInfo` per assignment in every section of `script`
/// matching `selected_kinds`. Anonymous sections are included only when
/// `include_anonymous_as_outputs` is true (resolved by the caller per spec
/// §4.8 step 2: "anonymous sections are treated as outputs only if no
/// `[outputs]` section exists").
///
/// Deduplicates by variable name: a later assignment anywhere in
/// section-then-statement source order replaces the earlier
/// `DependencyInfo` for the same name (last-writer-wins, spec §4.8 step 4 /
/// §9 Open Question 1); the caller is expected to log a warning when this
/// happens (see `crate::executor`).
pub fn analyze(script: &Script, selected_kinds: &[SectionKind], include_anonymous_as_outputs: bool) -> (Vec<DependencyInfo>, Vec<(String, SectionKind, SectionKind)>) {
    let user_function_names: HashSet<String> = script.functions.iter().map(|f| f.name.to_lowercase()).collect();
    let param_names: HashSet<String> = script.params.as_ref().map(|p| p.params.iter().map(|d| d.name.clone()).collect()).unwrap_or_default();

    let mut by_name: indexmap::IndexMap<String, DependencyInfo> = indexmap::IndexMap::new();
    let mut overwrites = Vec::new();

    for section in &script.sections {
        let included = selected_kinds.contains(&section.kind) || (section.kind == SectionKind::Anonymous && include_anonymous_as_outputs);
        if !included {
            continue;
        }
        for (idx, assignment) in section.assignments.iter().enumerate() {
            let var_name = assignment.var_name.clone().unwrap_or_else(|| format!("{}_{}", section.name, idx));
            let mut deps = IndexSet::new();
            assignment.expr.for_each_identifier(&mut |name| {
                let lname = name.to_string();
                if user_function_names.contains(&lname.to_lowercase()) {
                    return;
                }
                if param_names.contains(&lname) {
                    return;
                }
                if RESERVED_ENV_NAMES.contains(&lname.as_str()) {
                    return;
                }
                deps.insert(lname);
            });

            let mut has_function_call = false;
            let mut has_stateful = false;
            let mut has_non_concurrent = false;
            let mut has_parallel_list = false;
            assignment.expr.for_each_call(&mut |name, _pos, _named| {
                has_function_call = true;
                match builtin_concurrency(name) {
                    BuiltinConcurrency::Stateful => has_stateful = true,
                    BuiltinConcurrency::NonConcurrent => has_non_concurrent = true,
                    BuiltinConcurrency::ParallelList => has_parallel_list = true,
                    BuiltinConcurrency::Pure => {}
                    BuiltinConcurrency::Unknown => {
                        // user-defined function: treated as pure unless it
                        // transitively calls a stateful/non-concurrent
                        // built-in; that transitive check happens when the
                        // function body itself is analyzed (functions are
                        // evaluated as ordinary call expressions, so their
                        // own DependencyInfo would have flagged it there).
                    }
                }
            });

            let info = DependencyInfo {
                var_name: var_name.clone(),
                dependencies: deps,
                has_function_call,
                has_stateful_function: has_stateful,
                has_non_concurrent_function: has_non_concurrent,
                has_parallel_function_arguments: has_parallel_list,
                expr: assignment.expr.clone(),
                expr_text: assignment.expr_text.clone(),
                section_kind: section.kind,
                section_name: section.name.clone(),
            };

            if let Some(prev) = by_name.get(&var_name) {
                overwrites.push((var_name.clone(), prev.section_kind, section.kind));
            }
            by_name.insert(var_name, info);
        }
    }

    (by_name.into_values().collect(), overwrites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_script, ParseMode};

    #[test]
    fn collects_dependencies_and_filters_reserved() {
        let src = "[outputs]\na = img(0)\nb = (a + black_point) / 2\n";
        let outcome = parse_script(src, ParseMode::Strict).unwrap();
        let (infos, _) = analyze(&outcome.script, &[SectionKind::Outputs], false);
        let b = infos.iter().find(|i| i.var_name == "b").unwrap();
        assert!(b.dependencies.contains("a"));
        assert!(!b.dependencies.contains("black_point"));
    }

    #[test]
    fn flags_stateful_and_non_concurrent_calls() {
        let src = "[outputs]\nw = workdir(\"/tmp\")\ns = script(\"py\", \"x=1\")\n";
        let outcome = parse_script(src, ParseMode::Strict).unwrap();
        let (infos, _) = analyze(&outcome.script, &[SectionKind::Outputs], false);
        let w = infos.iter().find(|i| i.var_name == "w").unwrap();
        assert!(w.has_stateful_function);
        let s = infos.iter().find(|i| i.var_name == "s").unwrap();
        assert!(s.has_non_concurrent_function);
    }

    #[test]
    fn last_writer_wins_across_sections() {
        let src = "[tmp]\nx = 1\n[outputs]\nx = 2\n";
        let outcome = parse_script(src, ParseMode::Strict).unwrap();
        let (infos, overwrites) = analyze(&outcome.script, &[SectionKind::Tmp, SectionKind::Outputs], false);
        let x = infos.iter().find(|i| i.var_name == "x").unwrap();
        assert_eq!(x.expr, Expr::Number(2.0));
        assert_eq!(overwrites.len(), 1);
    }
}
