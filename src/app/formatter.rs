use crate::app::models::{ConfigurationDescriptor, PlanEntry};

pub struct OutputGenerator;

impl OutputGenerator {
    pub fn generate_plan(entries: &[PlanEntry], descriptor: &ConfigurationDescriptor) -> String {
        let mut output = String::new();

        for entry in entries {
            let indent = "    ".repeat(entry.depth.saturating_sub(1));
            let name = entry.relative_path.rsplit('/').next().unwrap_or_default();

            let marker = if entry.is_dir { "/" } else { "" };
            output.push_str(&format!("{}{}{}", indent, name, marker));
            if !entry.is_dir {
                output.push_str(&format!("  ({})", Self::describe_rule(entry.rule, descriptor)));
            }
            output.push('\n');
        }

        output.trim_end().to_string()
    }

    /// One-line summary such as `#0 babel-loader [@babel/preset-env, @babel/preset-react]`.
    pub fn describe_rule(rule: Option<usize>, descriptor: &ConfigurationDescriptor) -> String {
        let Some((idx, rule)) = rule.and_then(|idx| descriptor.rules().get(idx).map(|r| (idx, r)))
        else {
            return "untransformed".to_string();
        };

        let presets = &rule.handler.options.presets;
        if presets.is_empty() {
            format!("#{} {}", idx, rule.handler.loader)
        } else {
            format!("#{} {} [{}]", idx, rule.handler.loader, presets.join(", "))
        }
    }

    pub fn format_plan_output(root: &str, plan: &str, transformed: usize) -> String {
        let mut out = format!("<plan root=\"{}\" transformed=\"{}\">\n", root, transformed);
        out.push_str(plan);
        if !plan.is_empty() {
            out.push('\n');
        }
        out.push_str("</plan>");
        out
    }
}
