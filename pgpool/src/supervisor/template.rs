//! Failover-hook command template substitution (spec §6).
//!
//! Deliberately a dedicated formatter over the fixed alphabet below,
//! rather than a general templating library (§9 design notes).

/// Values available for substitution when rendering a hook command.
/// Any field left `None` renders as an empty string, matching the
/// original's `%H` = `""` when there is no new master.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// `%p` failed node's port.
    pub failed_port: Option<u16>,
    /// `%D` failed node's data directory.
    pub failed_data_directory: Option<String>,
    /// `%d` failed node's index.
    pub failed_index: Option<i32>,
    /// `%h` failed node's hostname.
    pub failed_hostname: Option<String>,
    /// `%H` new master's hostname.
    pub new_master_hostname: Option<String>,
    /// `%m` new master's index.
    pub new_master_index: Option<i32>,
    /// `%r` new master's port.
    pub new_master_port: Option<u16>,
    /// `%R` new master's data directory.
    pub new_master_data_directory: Option<String>,
    /// `%M` old master's index.
    pub old_master_index: Option<i32>,
    /// `%P` old primary's index.
    pub old_primary_index: Option<i32>,
}

/// Expands `template` left-to-right per the §6 grammar. Unknown `%`
/// escapes are dropped (the escape character and the following
/// character are both discarded); a trailing lone `%` is dropped too.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('p') => push_opt(&mut out, ctx.failed_port),
            Some('D') => push_opt_str(&mut out, &ctx.failed_data_directory),
            Some('d') => push_opt(&mut out, ctx.failed_index),
            Some('h') => push_opt_str(&mut out, &ctx.failed_hostname),
            Some('H') => push_opt_str(&mut out, &ctx.new_master_hostname),
            Some('m') => push_opt(&mut out, ctx.new_master_index),
            Some('r') => push_opt(&mut out, ctx.new_master_port),
            Some('R') => push_opt_str(&mut out, &ctx.new_master_data_directory),
            Some('M') => push_opt(&mut out, ctx.old_master_index),
            Some('P') => push_opt(&mut out, ctx.old_primary_index),
            Some('%') => out.push('%'),
            Some(_) => (), // unknown escape: drop both characters
            None => (),    // trailing '%': drop
        }
    }

    out
}

fn push_opt(out: &mut String, value: Option<impl std::fmt::Display>) {
    if let Some(value) = value {
        out.push_str(&value.to_string());
    }
}

fn push_opt_str(out: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        out.push_str(value);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_full_substitution() {
        let ctx = TemplateContext {
            failed_port: Some(5432),
            failed_data_directory: Some("/data/0".into()),
            failed_index: Some(1),
            failed_hostname: Some("db1".into()),
            new_master_hostname: Some("db0".into()),
            new_master_index: Some(0),
            new_master_port: Some(5433),
            new_master_data_directory: Some("/data/master".into()),
            old_master_index: Some(1),
            old_primary_index: Some(1),
        };

        let rendered = render("failed=%d host=%h new_master=%m@%H 100%%", &ctx);
        assert_eq!(rendered, "failed=1 host=db1 new_master=0@db0 100%");
    }

    #[test]
    fn test_missing_new_master_renders_empty() {
        let ctx = TemplateContext::default();
        assert_eq!(render("master=[%H]", &ctx), "master=[]");
    }

    #[test]
    fn test_unknown_escape_is_dropped() {
        let ctx = TemplateContext::default();
        assert_eq!(render("a%zb", &ctx), "ab");
    }

    #[test]
    fn test_trailing_percent_is_dropped() {
        let ctx = TemplateContext::default();
        assert_eq!(render("abc%", &ctx), "abc");
    }
}
