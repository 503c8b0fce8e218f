use std::collections::HashMap;
use std::str::FromStr;

/// Environment variables a descriptor asks to overlay on the engine process.
///
/// Entries are applied on top of the launching process's own environment, so
/// a descriptor only needs to name the variables it changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(HashMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Sets an environment variable, replacing any previous value.
    ///
    /// # Examples
    /// ```
    /// use testsystem_launcher::Environment;
    ///
    /// let mut env = Environment::new();
    /// env.set("CLASSPATH", "fitnesse.jar");
    /// assert_eq!(env.get("CLASSPATH").map(String::as_str), Some("fitnesse.jar"));
    /// ```
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// A single `KEY=VALUE` assignment, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub key: String,
    pub value: String,
}

impl FromStr for Assignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Assignment {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
        }
    }
}

impl FromIterator<Assignment> for Environment {
    fn from_iter<I: IntoIterator<Item = Assignment>>(iter: I) -> Self {
        Self(iter.into_iter().map(|a| (a.key, a.value)).collect())
    }
}
