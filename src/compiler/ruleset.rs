//! Step rulesets - decide at compile time whether a step runs

use crate::compiler::config::one_or_many;
use crate::compiler::CompileError;
use crate::core::BuildMetadata;
use regex::Regex;
use serde::Deserialize;

/// Rule lists keyed by the build field they test
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default, deserialize_with = "one_or_many")]
    pub branch: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub comment: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub event: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub path: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub tag: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub target: Vec<String>,
}

impl RulesConfig {
    fn is_empty(&self) -> bool {
        self.branch.is_empty()
            && self.comment.is_empty()
            && self.event.is_empty()
            && self.path.is_empty()
            && self.tag.is_empty()
            && self.target.is_empty()
    }
}

/// Ruleset configuration as defined in YAML
///
/// Rule keys written directly under `ruleset` are shorthand for `if`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesetConfig {
    #[serde(rename = "if", default)]
    pub if_rules: Option<RulesConfig>,

    #[serde(default)]
    pub unless: Option<RulesConfig>,

    #[serde(flatten)]
    pub shorthand: RulesConfig,

    #[serde(default)]
    pub operator: Operator,

    #[serde(default)]
    pub matcher: Matcher,

    /// Keep the build going when the step fails
    #[serde(default, rename = "continue")]
    pub continue_on_error: bool,
}

/// How the individual rules of a set combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    And,
    Or,
}

/// How rule values are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// Shell-style globs: `*` and `?` stay within a path segment, `**` crosses them
    #[default]
    Filepath,
    /// Regular expressions, matched anywhere in the value
    Regexp,
}

/// Pattern for matching a build field
#[derive(Debug, Clone)]
pub enum RulePattern {
    /// Exact string match
    Exact(String),
    /// Regular expression match
    Regex(Regex),
}

impl RulePattern {
    fn compile(pattern: &str, matcher: Matcher) -> Result<Self, CompileError> {
        let source = match matcher {
            Matcher::Regexp => pattern.to_string(),
            Matcher::Filepath if !pattern.contains(|c: char| matches!(c, '*' | '?' | '[')) => {
                return Ok(RulePattern::Exact(pattern.to_string()))
            }
            Matcher::Filepath => glob_to_regex(pattern),
        };

        Regex::new(&source)
            .map(RulePattern::Regex)
            .map_err(|e| CompileError::invalid(format!("invalid ruleset pattern '{}': {}", pattern, e)))
    }

    /// Check if the pattern matches the given value
    pub fn matches(&self, value: &str) -> bool {
        match self {
            RulePattern::Exact(pattern) => pattern == value,
            RulePattern::Regex(regex) => regex.is_match(value),
        }
    }
}

/// Translate a filepath glob into an anchored regular expression
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let class: String = chars.by_ref().take_while(|&c| c != ']').collect();
                out.push('[');
                match class.strip_prefix('!') {
                    Some(negated) => {
                        out.push('^');
                        out.push_str(negated);
                    }
                    None => out.push_str(&class),
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

/// Build fields a ruleset is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct RuleData<'a> {
    pub branch: &'a str,
    pub comment: &'a str,
    pub event: &'a str,
    pub path: &'a [String],
    pub tag: &'a str,
    pub target: &'a str,
}

impl<'a> From<&'a BuildMetadata> for RuleData<'a> {
    fn from(metadata: &'a BuildMetadata) -> Self {
        Self {
            branch: &metadata.branch,
            comment: &metadata.comment,
            event: &metadata.event,
            path: &metadata.changeset,
            tag: &metadata.tag,
            target: &metadata.target,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Rules {
    branch: Vec<RulePattern>,
    comment: Vec<RulePattern>,
    event: Vec<RulePattern>,
    path: Vec<RulePattern>,
    tag: Vec<RulePattern>,
    target: Vec<RulePattern>,
}

impl Rules {
    fn compile(config: &RulesConfig, matcher: Matcher) -> Result<Self, CompileError> {
        let compile_all = |patterns: &[String]| -> Result<Vec<RulePattern>, CompileError> {
            patterns
                .iter()
                .map(|p| RulePattern::compile(p, matcher))
                .collect()
        };

        Ok(Self {
            branch: compile_all(&config.branch)?,
            comment: compile_all(&config.comment)?,
            event: compile_all(&config.event)?,
            path: compile_all(&config.path)?,
            tag: compile_all(&config.tag)?,
            target: compile_all(&config.target)?,
        })
    }

    fn is_empty(&self) -> bool {
        self.branch.is_empty()
            && self.comment.is_empty()
            && self.event.is_empty()
            && self.path.is_empty()
            && self.tag.is_empty()
            && self.target.is_empty()
    }

    fn matches(&self, data: &RuleData<'_>, operator: Operator) -> bool {
        let any = |patterns: &[RulePattern], value: &str| patterns.iter().any(|p| p.matches(value));

        let results = [
            (!self.branch.is_empty()).then(|| any(&self.branch, data.branch)),
            (!self.comment.is_empty()).then(|| any(&self.comment, data.comment)),
            (!self.event.is_empty()).then(|| any(&self.event, data.event)),
            (!self.path.is_empty())
                .then(|| data.path.iter().any(|file| any(&self.path, file))),
            (!self.tag.is_empty()).then(|| any(&self.tag, data.tag)),
            (!self.target.is_empty()).then(|| any(&self.target, data.target)),
        ];

        let mut checked = results.iter().flatten().peekable();
        if checked.peek().is_none() {
            return true;
        }

        match operator {
            Operator::And => checked.all(|&matched| matched),
            Operator::Or => checked.any(|&matched| matched),
        }
    }
}

/// Compiled ruleset for one step
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    if_rules: Rules,
    unless: Rules,
    operator: Operator,
    continue_on_error: bool,
}

impl RulesetConfig {
    /// Compile the patterns of this ruleset
    pub fn compile(&self) -> Result<Ruleset, CompileError> {
        let if_config = match &self.if_rules {
            Some(rules) if !rules.is_empty() => {
                if !self.shorthand.is_empty() {
                    return Err(CompileError::invalid(
                        "ruleset cannot mix `if` with rules written directly under `ruleset`",
                    ));
                }
                rules
            }
            _ => &self.shorthand,
        };

        Ok(Ruleset {
            if_rules: Rules::compile(if_config, self.matcher)?,
            unless: match &self.unless {
                Some(rules) => Rules::compile(rules, self.matcher)?,
                None => Rules::default(),
            },
            operator: self.operator,
            continue_on_error: self.continue_on_error,
        })
    }
}

impl Ruleset {
    /// Whether a step guarded by this ruleset runs for `data`
    pub fn matches(&self, data: &RuleData<'_>) -> bool {
        if !self.if_rules.matches(data, self.operator) {
            return false;
        }

        self.unless.is_empty() || !self.unless.matches(data, self.operator)
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }
}
