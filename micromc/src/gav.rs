//! Maven-style library specifiers, used to locate libraries in the content store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::fmt;


/// A maven-style library specifier, known as GAV, for Group, Artifact, Version, but it
/// also contains an optional classifier and extension for the pointed file. Its string
/// format is `group:artifact:version[:classifier][@extension]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gav {
    group: String,
    artifact: String,
    version: String,
    classifier: Option<String>,
    extension: Option<String>,
}

impl Gav {

    /// Create a new library specifier with the given components.
    /// Each component, if given, should not be empty.
    pub fn new(group: &str, artifact: &str, version: &str, classifier: Option<&str>, extension: Option<&str>) -> Self {

        assert!(!group.is_empty(), "group empty");
        assert!(!artifact.is_empty(), "artifact empty");
        assert!(!version.is_empty(), "version empty");
        assert!(!classifier.is_some_and(str::is_empty), "classifier empty");
        assert!(!extension.is_some_and(str::is_empty), "extension empty");

        Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier: classifier.map(str::to_string),
            extension: extension.map(str::to_string),
        }

    }

    fn _from_str(raw: &str) -> Option<Self> {

        let (raw, extension) = match raw.split_once('@') {
            Some((raw, extension)) => (raw, Some(extension)),
            None => (raw, None),
        };

        let mut split = raw.split(':');
        let group = split.next()?;
        let artifact = split.next()?;
        let version = split.next()?;
        let classifier = split.next();

        if split.next().is_some() {
            return None;
        }

        if group.is_empty() || artifact.is_empty() || version.is_empty() {
            return None;
        }

        if classifier.is_some_and(str::is_empty) || extension.is_some_and(str::is_empty) {
            return None;
        }

        Some(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier: classifier.map(str::to_string),
            extension: extension.map(str::to_string),
        })

    }

    /// Return the group name of the library, never empty.
    #[inline]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Return the artifact name of the library, never empty.
    #[inline]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Return the version of the library, never empty.
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Change the version of the library, should not be empty.
    pub fn set_version(&mut self, version: &str) {
        assert!(!version.is_empty(), "version empty");
        self.version = version.to_string();
    }

    /// Return the classifier of the library, empty if no classifier.
    #[inline]
    pub fn classifier(&self) -> &str {
        self.classifier.as_deref().unwrap_or("")
    }

    /// Change the classifier of the library.
    pub fn set_classifier(&mut self, classifier: Option<&str>) {
        assert!(!classifier.is_some_and(str::is_empty), "classifier empty");
        self.classifier = classifier.map(str::to_string);
    }

    /// Return the extension of the library, never empty, defaults to "jar".
    #[inline]
    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("jar")
    }

    /// Return the key uniquely identifying this library regardless of its version, of
    /// the form `group:artifact[:classifier]`. Two libraries sharing this key point to
    /// the same artifact and only one of them can end up on the class path.
    pub fn unversioned_key(&self) -> String {
        let mut key = format!("{}:{}", self.group, self.artifact);
        if let Some(classifier) = self.classifier.as_deref() {
            key.push(':');
            key.push_str(classifier);
        }
        key
    }

    /// Return the terminal file name of this specifier, of the form
    /// `artifact-version[-classifier].extension`.
    pub fn file_name(&self) -> String {
        let mut name = format!("{}-{}", self.artifact, self.version);
        if let Some(classifier) = self.classifier.as_deref() {
            name.push('-');
            name.push_str(classifier);
        }
        name.push('.');
        name.push_str(self.extension());
        name
    }

    /// Create the standard repository file path of this GAV from a base directory:
    /// `<dir>/<group components>/<artifact>/<version>/<file name>`.
    pub fn file<P: AsRef<Path>>(&self, dir: P) -> PathBuf {

        // NOTE: Unsafe path joining if any component has a '..'!

        let mut buf = dir.as_ref().to_path_buf();
        for group_part in self.group.split('.') {
            buf.push(group_part);
        }

        buf.push(&self.artifact);
        buf.push(&self.version);
        buf.push(self.file_name());
        buf

    }

    /// Derive the download URL of this GAV below the root URL of a maven repository.
    pub fn url(&self, repository_url: &str) -> String {

        let mut url = repository_url.trim_end_matches('/').to_string();

        for group_part in self.group.split('.') {
            url.push('/');
            url.push_str(group_part);
        }

        url.push('/');
        url.push_str(&self.artifact);
        url.push('/');
        url.push_str(&self.version);
        url.push('/');
        url.push_str(&self.file_name());
        url

    }

}

impl FromStr for Gav {

    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::_from_str(s).ok_or(())
    }

}

impl fmt::Display for Gav {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = self.classifier.as_deref() {
            write!(f, ":{classifier}")?;
        }
        if let Some(extension) = self.extension.as_deref() {
            write!(f, "@{extension}")?;
        }
        Ok(())
    }
}

impl<'de> serde::Deserialize<'de> for Gav {

    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {

        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {

            type Value = Gav;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a string gav (group:artifact:version[:classifier][@extension])")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Gav::_from_str(v)
                    .ok_or_else(|| E::custom("invalid string gav (group:artifact:version[:classifier][@extension])"))
            }

        }

        deserializer.deserialize_str(Visitor)

    }

}

impl serde::Serialize for Gav {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {

    use std::str::FromStr;
    use super::Gav;

    #[test]
    #[should_panic]
    fn empty_group() {
        Gav::new("", "baz", "0.1.2-beta", None, None);
    }

    #[test]
    #[should_panic]
    fn empty_version() {
        Gav::new("foo.bar", "baz", "", None, None);
    }

    #[test]
    fn display_correct() {
        assert_eq!(Gav::new("foo.bar", "baz", "0.1.2-beta", None, None).to_string(), "foo.bar:baz:0.1.2-beta");
        assert_eq!(Gav::new("foo.bar", "baz", "0.1.2-beta", Some("natives"), None).to_string(), "foo.bar:baz:0.1.2-beta:natives");
        assert_eq!(Gav::new("foo.bar", "baz", "0.1.2-beta", None, Some("zip")).to_string(), "foo.bar:baz:0.1.2-beta@zip");
        assert_eq!(Gav::new("foo.bar", "baz", "0.1.2-beta", Some("natives"), Some("zip")).to_string(), "foo.bar:baz:0.1.2-beta:natives@zip");
    }

    #[test]
    fn from_str_correct() {

        const WRONG_CASES: &[&str] = &[
            "", ":", "::",
            "foo.bar::", ":baz:", "::0.1.2-beta",
            "foo.bar:baz:", "foo.bar::0.1.2-beta", ":baz:0.1.2-beta",
            "foo.bar:baz:0.1.2-beta:",
            "foo.bar:baz:0.1.2-beta@",
            "foo.bar:baz:0.1.2-beta:natives:extra",
        ];

        for case in WRONG_CASES {
            assert_eq!(Gav::from_str(case), Err(()));
        }

        let gav = Gav::from_str("foo.bar:baz:0.1.2-beta").unwrap();
        assert_eq!(gav.group(), "foo.bar");
        assert_eq!(gav.artifact(), "baz");
        assert_eq!(gav.version(), "0.1.2-beta");
        assert_eq!(gav.classifier(), "");
        assert_eq!(gav.extension(), "jar");

        let gav = Gav::from_str("foo.bar:baz:0.1.2-beta:natives@txt").unwrap();
        assert_eq!(gav.classifier(), "natives");
        assert_eq!(gav.extension(), "txt");

    }

    #[test]
    fn file_correct() {
        let gav = Gav::from_str("com.mojang:authlib:2.2.30").unwrap();
        let file = gav.file("/libraries");
        let expected: std::path::PathBuf = ["/libraries", "com", "mojang", "authlib", "2.2.30", "authlib-2.2.30.jar"].iter().collect();
        assert_eq!(file, expected);
        assert_eq!(gav.url("https://libraries.minecraft.net/"), "https://libraries.minecraft.net/com/mojang/authlib/2.2.30/authlib-2.2.30.jar");
    }

    #[test]
    fn unversioned_key_correct() {
        let a = Gav::from_str("org.lwjgl:lwjgl:3.3.1").unwrap();
        let b = Gav::from_str("org.lwjgl:lwjgl:3.3.2").unwrap();
        let c = Gav::from_str("org.lwjgl:lwjgl:3.3.1:natives-linux").unwrap();
        assert_eq!(a.unversioned_key(), b.unversioned_key());
        assert_ne!(a.unversioned_key(), c.unversioned_key());
    }

}
