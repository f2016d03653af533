//! LCOV tracefile renderer.
//!
//! ```text
//! TN:
//! SF:<source file>
//! FN:<line>,<function name>
//! FNDA:<execution count>,<function name>
//! FNF:<functions found>
//! FNH:<functions hit>
//! DA:<line>,<execution count>
//! LF:<lines found>
//! LH:<lines hit>
//! BRDA:<line>,<block>,<branch>,<taken>
//! BRF:<branches found>
//! BRH:<branches hit>
//! end_of_record
//! ```

use super::{ReportContext, ReportRenderer};
use crate::result::CoverResult;
use std::fmt::Write;

/// Renders `lcov.info`
#[derive(Debug, Clone, Copy, Default)]
pub struct LcovRenderer;

impl ReportRenderer for LcovRenderer {
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String> {
        let mut output = String::new();

        for (path, coverage) in ctx.map.iter() {
            output.push_str("TN:\n");
            let _ = writeln!(output, "SF:{path}");

            let mut functions_hit = 0;
            for (id, meta) in &coverage.fn_map {
                let count = coverage.f.get(id).copied().unwrap_or(0);
                let _ = writeln!(output, "FN:{},{}", meta.line, meta.name);
                let _ = writeln!(output, "FNDA:{count},{}", meta.name);
                if count > 0 {
                    functions_hit += 1;
                }
            }
            let _ = writeln!(output, "FNF:{}", coverage.fn_map.len());
            let _ = writeln!(output, "FNH:{functions_hit}");

            let lines = coverage.line_hits();
            let mut lines_hit = 0;
            for (line, count) in &lines {
                let _ = writeln!(output, "DA:{line},{count}");
                if *count > 0 {
                    lines_hit += 1;
                }
            }
            let _ = writeln!(output, "LF:{}", lines.len());
            let _ = writeln!(output, "LH:{lines_hit}");

            let (mut found, mut hit) = (0, 0);
            for (id, meta) in &coverage.branch_map {
                let arms = coverage.b.get(id).map(Vec::as_slice).unwrap_or_default();
                let evaluated = arms.iter().any(|count| *count > 0);
                for (arm, count) in arms.iter().enumerate() {
                    found += 1;
                    if *count > 0 {
                        hit += 1;
                    }
                    if evaluated {
                        let _ = writeln!(output, "BRDA:{},{id},{arm},{count}", meta.line);
                    } else {
                        let _ = writeln!(output, "BRDA:{},{id},{arm},-", meta.line);
                    }
                }
            }
            let _ = writeln!(output, "BRF:{found}");
            let _ = writeln!(output, "BRH:{hit}");

            output.push_str("end_of_record\n");
        }

        Ok(output)
    }
}
