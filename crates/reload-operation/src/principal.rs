/// The caller on whose behalf a reload runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
    administrator: bool,
}

impl Principal {
    pub fn new(name: impl Into<String>, administrator: bool) -> Self {
        Self {
            name: name.into(),
            administrator,
        }
    }

    pub fn administrator(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_administrator(&self) -> bool {
        self.administrator
    }
}
