//! Declarative bot definitions loaded from YAML

use crate::bot::Bot;
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::rule::{Action, ErrorRule, Rule};
use crate::state::{BotState, Transition};
use crate::template;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotDefinition {
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides `BotConfig::starting_state` when set
    #[serde(default)]
    pub starting_state: Option<String>,
    /// Values available to templates as `{{bot.<name>}}`
    #[serde(default)]
    pub globals: HashMap<String, String>,
    pub states: Vec<StateDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDefinition {
    pub name: String,
    #[serde(default)]
    pub entry_message: String,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub error_rules: Vec<ErrorRuleDefinition>,
}

/// Exactly one of `kind` and `pattern` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRuleDefinition {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    pub message: String,
}

impl ErrorRuleDefinition {
    fn compile(&self, rule: &str) -> Result<ErrorRule> {
        match (&self.kind, &self.pattern) {
            (Some(kind), None) => Ok(ErrorRule::on_flag(kind.clone(), self.message.clone())),
            (None, Some(pattern)) => ErrorRule::on_pattern(pattern, self.message.clone()),
            _ => Err(BotError::Definition(format!(
                "error rule of '{}' needs exactly one of `kind` or `pattern`",
                rule
            ))),
        }
    }
}

impl RuleDefinition {
    fn compile(&self) -> Result<Rule> {
        let error_rules = self
            .error_rules
            .iter()
            .map(|error_rule| error_rule.compile(&self.name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Rule::new(self.name.clone(), &self.pattern, self.response.clone())?
            .with_actions(self.actions.clone())
            .with_error_rules(error_rules))
    }
}

impl BotDefinition {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Check structural consistency: unique state names, known transition
    /// targets and a known starting state.
    pub fn validate(&self, starting_state: &str) -> Result<()> {
        let mut names = HashSet::new();
        for state in &self.states {
            if !names.insert(state.name.as_str()) {
                return Err(BotError::Definition(format!(
                    "state '{}' defined more than once",
                    state.name
                )));
            }
        }

        if !names.contains(starting_state) {
            return Err(BotError::Definition(format!(
                "starting state '{}' is not defined",
                starting_state
            )));
        }

        for state in &self.states {
            if let Some(transition) = state
                .transitions
                .iter()
                .find(|t| !names.contains(t.target.as_str()))
            {
                return Err(BotError::Definition(format!(
                    "transition '{}' of state '{}' targets unknown state '{}'",
                    transition.event, state.name, transition.target
                )));
            }
        }
        Ok(())
    }

    /// Templates referencing `{{bot.x}}` where `x` is not a declared global.
    pub fn unknown_global_references(&self) -> Vec<String> {
        let templates = self.states.iter().flat_map(|state| {
            std::iter::once(state.entry_message.as_str()).chain(state.rules.iter().flat_map(|rule| {
                std::iter::once(rule.response.as_str())
                    .chain(rule.error_rules.iter().map(|e| e.message.as_str()))
            }))
        });

        let mut unknown = Vec::new();
        for text in templates {
            for name in template::global_references(text) {
                if !self.globals.contains_key(&name) && !unknown.contains(&name) {
                    unknown.push(name);
                }
            }
        }
        unknown
    }
}

impl Bot {
    /// Build a bot from a definition. All patterns are compiled before any
    /// state is registered.
    pub fn from_definition(definition: &BotDefinition, mut config: BotConfig) -> Result<Self> {
        if let Some(name) = &definition.name {
            config.name = name.clone();
        }
        if let Some(starting_state) = &definition.starting_state {
            config.starting_state = starting_state.clone();
        }
        definition.validate(&config.starting_state)?;

        for name in definition.unknown_global_references() {
            warn!(
                "[{}] Template references undefined global 'bot.{}'",
                config.name, name
            );
        }

        let states = definition
            .states
            .iter()
            .map(|state| {
                let rules = state
                    .rules
                    .iter()
                    .map(RuleDefinition::compile)
                    .collect::<Result<Vec<_>>>()?;
                Ok(BotState::new(
                    state.name.clone(),
                    state.entry_message.clone(),
                    state.transitions.clone(),
                    rules,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let bot = Bot::new(config);
        for (name, value) in &definition.globals {
            bot.set_global_var(name.clone(), value.clone());
        }
        let count = states.len();
        for state in states {
            bot.register_state(state);
        }

        info!("[{}] Loaded {} states from definition", bot.config().name, count);
        Ok(bot)
    }
}
