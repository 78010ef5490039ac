//! Host platform identifiers used to select qualified subcategories.

/// Every identifier some supported host reports.
pub const KNOWN_IDENTS: [&str; 4] = ["unix", "linux", "macos", "win"];

/// The set of platform identifiers active on a build host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    idents: Vec<String>,
}

impl Platform {
    pub fn host() -> Self {
        let idents: &[&str] = if cfg!(target_os = "linux") {
            &["unix", "linux"]
        } else if cfg!(target_os = "macos") {
            &["unix", "macos"]
        } else if cfg!(unix) {
            &["unix"]
        } else if cfg!(windows) {
            &["win"]
        } else {
            &[]
        };
        Self::from_idents(idents.iter().copied())
    }

    pub fn from_idents<I, S>(idents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            idents: idents.into_iter().map(Into::into).collect(),
        }
    }

    /// True when a subcategory qualified with `qualifier` applies here.
    /// The default (empty) qualifier always applies.
    pub fn matches(&self, qualifier: &str) -> bool {
        qualifier.is_empty() || self.idents.iter().any(|i| i == qualifier)
    }

    pub fn is_known(ident: &str) -> bool {
        KNOWN_IDENTS.contains(&ident)
    }

    pub fn idents(&self) -> &[String] {
        &self.idents
    }
}
