use crate::config::Config;
use crate::error::ConfigError;

/// Lay one TOML layer over an already-resolved [`Config`].
///
/// `load_config` calls this twice: the global `config.toml` over the
/// defaults, then the nearest `.sde/config.toml` over that result. Tables
/// such as `[sourcekite]` merge key by key, so a project file can set
/// `docker_mode` alone. Arrays, `[[targets]]` included, replace the lower
/// layer's value.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let base_str = toml::to_string(base).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut base_val: toml::Value =
        toml::from_str(&base_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let overlay_val: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_values(&mut base_val, &overlay_val);

    let merged: Config = base_val
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;

    Ok(merged)
}

/// Recursive table merge; non-table values from `overlay` win.
fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    merge_values(base_val, val);
                } else {
                    base_table.insert(key.clone(), val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_empty_overlay_returns_base() {
        let base = Config::default();
        let merged = merge_configs(&base, "").expect("merge empty");
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_overrides_sourcekite_path() {
        let base = Config::default();
        let overlay = "[sourcekite]\npath = \"/opt/bin/sourcekite\"\n";
        let merged = merge_configs(&base, overlay).expect("merge");
        assert_eq!(merged.sourcekite.path, "/opt/bin/sourcekite");
        assert_eq!(merged.sourcekite.max_retries, 5);
        assert!(!merged.sourcekite.docker_mode);
    }

    #[test]
    fn merge_adds_optional_toolchain() {
        let base = Config::default();
        let overlay = "[sourcekite]\ntoolchain_path = \"/toolchains/5.9\"\n";
        let merged = merge_configs(&base, overlay).expect("merge");
        assert_eq!(
            merged.sourcekite.toolchain_path.as_deref(),
            Some(std::path::Path::new("/toolchains/5.9"))
        );
    }

    #[test]
    fn merge_replaces_target_list() {
        let mut base = Config::default();
        base.targets.push(crate::config::TargetEntry {
            name: "Old".into(),
            path: "Sources/Old".into(),
            sources: None,
            compiler_arguments: vec![],
        });
        let overlay = "[[targets]]\nname = \"New\"\npath = \"Sources/New\"\n";
        let merged = merge_configs(&base, overlay).expect("merge");
        assert_eq!(merged.targets.len(), 1);
        assert_eq!(merged.targets[0].name, "New");
    }

    #[test]
    fn project_layer_keeps_global_keys_it_does_not_set() {
        let global = merge_configs(
            &Config::default(),
            "[sourcekite]\nshell_path = \"/bin/zsh\"\nmax_retries = 2\n",
        )
        .expect("global layer");
        let project =
            merge_configs(&global, "[sourcekite]\ndocker_mode = true\n").expect("project layer");
        assert!(project.sourcekite.docker_mode);
        assert_eq!(
            project.sourcekite.shell_path.as_deref(),
            Some(std::path::Path::new("/bin/zsh"))
        );
        assert_eq!(project.sourcekite.max_retries, 2);
    }

    #[test]
    fn merge_invalid_overlay_returns_parse_error() {
        let base = Config::default();
        let result = merge_configs(&base, "{{invalid}}");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn merge_preserves_unrelated_sections() {
        let base = Config::default();
        let overlay = "[format]\nindent_width = 2\n";
        let merged = merge_configs(&base, overlay).expect("merge");
        assert_eq!(merged.format.indent_width, 2);
        assert_eq!(merged.sourcekite, base.sourcekite);
        assert_eq!(merged.swift, base.swift);
        assert_eq!(merged.log, base.log);
    }
}
