//! Execution environments that wrap service commands.

use serde::{Deserialize, Serialize};

/// Environment a command should run inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecEnv {
    /// Run inside a named conda-style environment (`mamba run -n <env> ...`).
    Conda {
        #[serde(default = "default_env_manager")]
        manager: String,
        env: String,
    },
    /// Prepend an arbitrary launcher.
    Prefix { prefix: String },
}

fn default_env_manager() -> String {
    "mamba".to_string()
}

impl ExecEnv {
    pub fn conda(env: impl Into<String>) -> Self {
        ExecEnv::Conda {
            manager: default_env_manager(),
            env: env.into(),
        }
    }

    /// Wrap `command` so it runs inside this environment.
    pub fn wrap(&self, command: &str) -> String {
        match self {
            ExecEnv::Conda { manager, env } => format!("{} run -n {} {}", manager, env, command),
            ExecEnv::Prefix { prefix } => format!("{} {}", prefix, command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conda_wrap() {
        assert_eq!(
            ExecEnv::conda("etl").wrap("python job.py"),
            "mamba run -n etl python job.py"
        );
    }

    #[test]
    fn test_prefix_wrap() {
        let env = ExecEnv::Prefix {
            prefix: "nice -n 10".to_string(),
        };
        assert_eq!(env.wrap("make"), "nice -n 10 make");
    }
}
