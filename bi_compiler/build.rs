// build.rs - TOML-driven constant generation
use std::env;
use std::fs;
use std::path::Path;

#[derive(serde::Deserialize)]
struct CompileTimeConfig {
    rules: RuleLimits,
    matching: MatchingLimits,
    evaluation: EvaluationLimits,
    logging: LoggingLimits,
}

#[derive(serde::Deserialize)]
struct RuleLimits {
    max_rule_depth: usize,
}

#[derive(serde::Deserialize)]
struct MatchingLimits {
    site_separator: char,
    max_pattern_cache_entries: usize,
}

#[derive(serde::Deserialize)]
struct EvaluationLimits {
    default_row_limit: usize,
}

#[derive(serde::Deserialize)]
struct LoggingLimits {
    max_log_message_length: usize,
    memory_logger_capacity: usize,
    min_log_level: u8,
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=BI_BUILD_PROFILE");
    println!("cargo:rerun-if-env-changed=BI_CONFIG_DIR");

    let profile = env::var("BI_BUILD_PROFILE").unwrap_or_else(|_| "development".to_string());
    let config_dir = env::var("BI_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

    // Find workspace root (parent of bi_compiler directory)
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = Path::new(&manifest_dir)
        .parent()
        .expect("Could not find workspace root (parent directory)");

    let config_path = workspace_root
        .join(&config_dir)
        .join(format!("{}.toml", profile));

    println!("cargo:rerun-if-changed={}", config_path.display());

    if !config_path.exists() {
        panic!(
            "Configuration file not found: {}\nWorkspace root: {}\nLooking for: {}/{}/{}.toml",
            config_path.display(),
            workspace_root.display(),
            workspace_root.display(),
            config_dir,
            profile
        );
    }

    let config_content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", config_path.display(), e));

    let config: CompileTimeConfig = toml::from_str(&config_content)
        .unwrap_or_else(|e| panic!("Invalid TOML in {}: {}", config_path.display(), e));

    validate_constraints(&config, &profile);
    generate_constants(&config, &profile);
}

fn validate_constraints(config: &CompileTimeConfig, profile: &str) {
    if config.rules.max_rule_depth == 0 || config.rules.max_rule_depth > 1000 {
        panic!("rules.max_rule_depth must be within 1..=1000");
    }

    let sep = config.matching.site_separator;
    if sep.is_alphanumeric() || sep == '-' || sep == '.' || sep == '_' {
        panic!(
            "matching.site_separator '{}' collides with legal hostname characters",
            sep
        );
    }

    if config.matching.max_pattern_cache_entries == 0 {
        panic!("matching.max_pattern_cache_entries must be positive");
    }

    if config.logging.min_log_level > 3 {
        panic!("logging.min_log_level too high (max: 3)");
    }

    if profile == "production" && config.logging.min_log_level > 2 {
        panic!("PRODUCTION: debug logging cannot be the compiled-in default");
    }
}

fn generate_constants(config: &CompileTimeConfig, profile: &str) {
    let out_dir = env::var("OUT_DIR").unwrap();
    let output_path = Path::new(&out_dir).join("constants.rs");

    let constants_code = format!(
        r#"
// Generated compile-time constants from TOML configuration
// Profile: {}
// DO NOT EDIT - Generated by build.rs

pub mod compile_time {{
    pub mod rules {{
        pub const MAX_RULE_DEPTH: usize = {};
    }}

    pub mod matching {{
        pub const SITE_SEPARATOR: char = {:?};
        /// Bound on the compiled-pattern memo. Reaching it clears the memo,
        /// so patterns are recompiled on next use rather than kept for the
        /// whole process lifetime.
        pub const MAX_PATTERN_CACHE_ENTRIES: usize = {};
    }}

    pub mod evaluation {{
        pub const DEFAULT_ROW_LIMIT: usize = {};
    }}

    pub mod logging {{
        pub const MAX_LOG_MESSAGE_LENGTH: usize = {};
        pub const MEMORY_LOGGER_CAPACITY: usize = {};
        pub const MIN_LOG_LEVEL: u8 = {};
    }}
}}
"#,
        profile,
        config.rules.max_rule_depth,
        config.matching.site_separator,
        config.matching.max_pattern_cache_entries,
        config.evaluation.default_row_limit,
        config.logging.max_log_message_length,
        config.logging.memory_logger_capacity,
        config.logging.min_log_level,
    );

    fs::write(output_path, constants_code).unwrap();
}
