use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_solver_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_budget_won")]
    pub budget_won: f64,
    #[serde(default = "default_target_kcal")]
    pub target_kcal: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub school_name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_renderer_url")]
    pub renderer_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Substitute the deterministic in-process solver when the HTTP solver
    /// is unreachable. Off by default so failures stay visible.
    #[serde(default)]
    pub mock_fallback: bool,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub solver_url: Option<String>,
    pub school_name: Option<String>,
    pub mock_fallback: Option<bool>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/mealflow/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(solver_url) = overrides.solver_url {
            self.solver.base_url = solver_url;
        }
        if let Some(school_name) = overrides.school_name {
            self.report.school_name = school_name;
        }
        if let Some(mock_fallback) = overrides.mock_fallback {
            self.workflow.mock_fallback = mock_fallback;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        expand_tilde(&self.report.output_dir)
    }

    pub fn default_template() -> String {
        let template = r#"[solver]
base_url = "http://localhost:8000"

[defaults]
days = 20
budget_won = 5370.0
target_kcal = 900.0

[report]
school_name = ""
author = ""
renderer_url = "http://localhost:8000"
output_dir = "~/.local/share/mealflow/reports"

[workflow]
mock_fallback = false
page_size = 25
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            defaults: DefaultsConfig::default(),
            report: ReportConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_solver_url(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            budget_won: default_budget_won(),
            target_kcal: default_target_kcal(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            school_name: String::new(),
            author: String::new(),
            renderer_url: default_renderer_url(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mock_fallback: false,
            page_size: default_page_size(),
        }
    }
}

fn default_solver_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_days() -> u32 {
    crate::params::DEFAULT_DAYS
}

fn default_budget_won() -> f64 {
    crate::params::DEFAULT_BUDGET_WON
}

fn default_target_kcal() -> f64 {
    crate::params::DEFAULT_TARGET_KCAL
}

fn default_renderer_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_output_dir() -> String {
    "~/.local/share/mealflow/reports".to_string()
}

fn default_page_size() -> usize {
    crate::plan::DEFAULT_PAGE_SIZE
}
