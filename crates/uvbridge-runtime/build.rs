//! Build script for uvbridge-runtime
//!
//! Merges bridge configuration defaults:
//! 1. Start with library defaults
//! 2. If UVB_CONFIG_RS is set, parse that file for `pub const` overrides
//! 3. Generate OUT_DIR/uvb_merged_config.rs (user values win)
//!
//! Only the values being changed need to appear in the user file.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "MAX_ANCHORS",
        rust_type: "usize",
        default_value: "1_048_576",
    },
    ConfigParam {
        name: "SUGGESTED_ALLOC",
        rust_type: "usize",
        default_value: "65_536",
    },
    ConfigParam {
        name: "LOCK_PARK_TIMEOUT_US",
        rust_type: "u64",
        default_value: "1_000",
    },
    ConfigParam {
        name: "LOCK_SPINS",
        rust_type: "u32",
        default_value: "64",
    },
    ConfigParam {
        name: "STRICT_SHAPES",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => dir,
        Err(_) => panic!("OUT_DIR not set"),
    };
    let dest_path = Path::new(&out_dir).join("uvb_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    if let Ok(user_path) = env::var("UVB_CONFIG_RS") {
        println!("cargo:rerun-if-changed={}", user_path);

        match fs::read_to_string(&user_path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom bridge config: {}", user_path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read UVB_CONFIG_RS ({}): {}", user_path, e);
            }
        }
    }

    println!("cargo:rerun-if-env-changed=UVB_CONFIG_RS");
    println!("cargo:rerun-if-changed=build.rs");

    let output = generate_config(&config);
    if let Err(e) = fs::write(&dest_path, output) {
        panic!("failed to write merged config: {}", e);
    }
}

/// Parse `pub const NAME: TYPE = VALUE;` lines and merge known names.
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }

        if let Some((name, value)) = parse_const_line(line) {
            match CONFIG_PARAMS.iter().find(|p| p.name == name) {
                Some(param) => {
                    config.insert(param.name, value);
                }
                None => println!("cargo:warning=Unknown bridge config parameter: {}", name),
            }
        }
    }
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();

    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();

    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    let value = rest[eq_pos + 1..semi_pos].trim().to_string();

    Some((name, value))
}

fn generate_config(config: &HashMap<&str, String>) -> String {
    let mut output = String::new();

    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Bridge configuration merged from library defaults");
    if env::var("UVB_CONFIG_RS").is_ok() {
        output.push_str(" and UVB_CONFIG_RS");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        let result = parse_const_line("pub const MAX_ANCHORS: usize = 4096;");
        assert_eq!(result, Some(("MAX_ANCHORS".into(), "4096".into())));

        let result = parse_const_line("pub const STRICT_SHAPES: bool = true;");
        assert_eq!(result, Some(("STRICT_SHAPES".into(), "true".into())));
    }

    #[test]
    fn test_parse_and_merge_ignores_unknown() {
        let mut config: HashMap<&str, String> = HashMap::new();
        config.insert("LOCK_SPINS", "64".into());

        let user_config = r#"
            // tuned for a busy loop thread
            pub const LOCK_SPINS: u32 = 256;
            pub const NOT_A_PARAM: u32 = 1;
        "#;
        parse_and_merge(user_config, &mut config);

        assert_eq!(config.get("LOCK_SPINS"), Some(&"256".to_string()));
        assert!(!config.contains_key("NOT_A_PARAM"));
    }
}
