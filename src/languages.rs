//! Language configuration for compilation and execution

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Placeholder in `compile_command` replaced by the staged source files
pub const SOURCES_PLACEHOLDER: &str = "{sources}";
/// Placeholder in `run_command` replaced by the entry point
pub const ENTRY_PLACEHOLDER: &str = "{entry}";

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical language name (table key)
    pub name: String,
    /// Extension of the files handed to the compiler (e.g., "java")
    pub source_extension: String,
    /// Compile command template (None if not needed)
    pub compile_command: Option<Vec<String>>,
    /// Run command template
    pub run_command: Vec<String>,
    /// Entry point used when the request does not name one
    pub entry_point: String,
    /// Time limit multiplier and bonus: (multiplier, bonus_seconds)
    /// actual_time = base_time * multiplier + bonus
    pub time_limit: Option<(u32, u32)>,
    /// Memory limit multiplier and bonus: (multiplier, bonus_mb)
    /// actual_memory = base_memory * multiplier + bonus
    pub memory_limit: Option<(u32, u32)>,
}

impl LanguageConfig {
    /// Calculate actual time limit based on base time limit
    /// base_time_ms: base time limit in milliseconds
    /// Returns: adjusted time limit in milliseconds
    pub fn calculate_time_limit(&self, base_time_ms: u32) -> u32 {
        match self.time_limit {
            Some((multiplier, bonus_seconds)) => base_time_ms
                .saturating_mul(multiplier)
                .saturating_add(bonus_seconds.saturating_mul(1000)),
            None => base_time_ms,
        }
    }

    /// Calculate actual memory limit based on base memory limit
    pub fn calculate_memory_limit(&self, base_memory_mb: u32) -> u32 {
        match self.memory_limit {
            Some((multiplier, bonus_mb)) => base_memory_mb
                .saturating_mul(multiplier)
                .saturating_add(bonus_mb),
            None => base_memory_mb,
        }
    }

    /// Whether `file_name` is one of this language's compilable sources
    pub fn is_source_file(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.source_extension)
    }

    /// Build the compile command for the given sources, if the language compiles
    pub fn compile_command_for(&self, sources: &[String]) -> Option<Vec<String>> {
        let template = self.compile_command.as_ref()?;
        let mut command = Vec::with_capacity(template.len() + sources.len());
        for part in template {
            if part == SOURCES_PLACEHOLDER {
                command.extend(sources.iter().cloned());
            } else {
                command.push(part.clone());
            }
        }
        Some(command)
    }

    /// Build the run command for the given entry point
    pub fn run_command_for(&self, entry_point: &str) -> Vec<String> {
        self.run_command
            .iter()
            .map(|part| part.replace(ENTRY_PLACEHOLDER, entry_point))
            .collect()
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_extension: String,
    compile_command: Option<String>,
    run_command: String,
    entry_point: String,
    #[serde(default)]
    time_limit: Vec<String>,
    #[serde(default)]
    memory_limit: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// All configured languages, keyed by lowercase name and alias
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    languages: HashMap<String, LanguageConfig>,
}

impl LanguageTable {
    /// Load the table from `path`, or from the built-in table when `path` is None
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read language table {}", path.display())
                })?;
                Self::parse(&content)
                    .with_context(|| format!("Invalid language table {}", path.display()))
            }
            None => Self::parse(include_str!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/files/languages.toml"
            ))),
        }
    }

    /// Parse a language table from TOML
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut languages = HashMap::new();

        for (name, raw) in raw_configs {
            let parse_limit =
                |raw_limit: Vec<String>, kind: &str| -> anyhow::Result<Option<(u32, u32)>> {
                    if raw_limit.is_empty() {
                        return Ok(None);
                    }
                    if raw_limit.len() != 2 {
                        anyhow::bail!("Invalid {} limit for {}: {:?}", kind, name, raw_limit);
                    }
                    let multiplier = raw_limit[0].parse::<u32>().with_context(|| {
                        format!("Invalid {} multiplier for {}: {}", kind, name, raw_limit[0])
                    })?;
                    let offset = raw_limit[1].parse::<u32>().with_context(|| {
                        format!("Invalid {} offset for {}: {}", kind, name, raw_limit[1])
                    })?;
                    Ok(Some((multiplier, offset)))
                };

            let run_command = into_command(&raw.run_command);
            if run_command.is_empty() {
                anyhow::bail!("Empty run command for {}", name);
            }
            let compile_command = raw
                .compile_command
                .map(|cmd| into_command(&cmd))
                .filter(|cmd| !cmd.is_empty());

            let config = LanguageConfig {
                name: name.to_lowercase(),
                source_extension: raw.source_extension.trim_start_matches('.').to_string(),
                compile_command,
                run_command,
                entry_point: raw.entry_point,
                time_limit: parse_limit(raw.time_limit, "time")?,
                memory_limit: parse_limit(raw.memory_limit, "memory")?,
            };

            for alias in raw.aliases {
                languages.insert(alias.to_lowercase(), config.clone());
            }
            languages.insert(name.to_lowercase(), config);
        }

        Ok(Self { languages })
    }

    /// Get language configuration by language name or alias
    pub fn get(&self, language: &str) -> Option<&LanguageConfig> {
        self.languages.get(&language.trim().to_lowercase())
    }

    /// Get all supported language names (aliases included)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.languages.keys().cloned().collect();
        names.sort();
        names
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[c]
source_extension = "c"
compile_command = "gcc -o main {{sources}}"
run_command = "./main"
entry_point = "main"

[python]
source_extension = ".py"
run_command = "python3 {{entry}}"
entry_point = "main.py"
time_limit = ["3", "2"]
aliases = ["py", "python3"]
"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_load_languages() {
        let config_file = create_test_config();
        let table = LanguageTable::load(Some(config_file.path())).unwrap();

        assert!(table.get("c").is_some());
        assert!(table.get("PY").is_some());
        assert_eq!(table.get("python3").unwrap().name, "python");
        assert_eq!(table.get("python").unwrap().source_extension, "py");
        assert!(table.get("python").unwrap().compile_command.is_none());
    }

    #[test]
    fn test_builtin_table_has_java() {
        let table = LanguageTable::load(None).unwrap();
        let java = table.get("java").unwrap();

        assert_eq!(java.entry_point, "Main");
        assert!(java.is_source_file("Main.java"));
        assert!(!java.is_source_file("notes.txt"));
        assert!(!java.is_source_file("java"));
    }

    #[test]
    fn test_compile_command_expands_sources() {
        let table = LanguageTable::load(None).unwrap();
        let java = table.get("java").unwrap();
        let sources = vec!["A.java".to_string(), "Main.java".to_string()];

        assert_eq!(
            java.compile_command_for(&sources).unwrap(),
            vec!["javac", "-encoding", "UTF-8", "A.java", "Main.java"]
        );
        assert_eq!(java.run_command_for("Main"), vec!["java", "-cp", ".", "Main"]);
    }

    #[test]
    fn test_time_limit_bonus() {
        let config_file = create_test_config();
        let table = LanguageTable::load(Some(config_file.path())).unwrap();

        assert_eq!(table.get("py").unwrap().calculate_time_limit(1000), 5000);
        assert_eq!(table.get("c").unwrap().calculate_time_limit(1000), 1000);
        assert_eq!(table.get("c").unwrap().calculate_memory_limit(256), 256);
    }

    #[test]
    fn test_invalid_limit_rejected() {
        let content = r#"
[bad]
source_extension = "x"
run_command = "./x"
entry_point = "x"
time_limit = ["2"]
"#;
        assert!(LanguageTable::parse(content).is_err());
    }
}
