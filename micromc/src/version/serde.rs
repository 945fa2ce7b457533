//! JSON schemas of version metadata and asset indexes for serde deserialization.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::serde::{HexString, RegexString};
use crate::gav::Gav;


/// SHA-1 hashes are stored as 40 lower hex characters in every Mojang manifest.
pub type Sha1Hash = HexString<20>;

// ================== //
//  VERSION METADATA  //
// ================== //

/// A version metadata JSON schema, this is the on-disk `versions/<id>/<id>.json`
/// document describing how to launch one version.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    /// The version id, should be the same as the directory the metadata is in.
    pub id: String,
    /// The version type, such as 'release' or 'snapshot'.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<VersionType>,
    /// The first release time of this version, if known.
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_date_time_chill")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<DateTime<FixedOffset>>,
    /// If present, this is the name of another version to resolve after this one and
    /// where fallback values will be taken. Mod loader installers write metadata
    /// pointing back to the vanilla version they were installed over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    /// Describe the Java version to use, optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersion>,
    /// The asset index to use when launching the game, with download information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<VersionAssetIndex>,
    /// Legacy asset index id without download information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    /// A mapping of downloads for entry point JAR files, such as for client or for
    /// server.
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub downloads: HashMap<String, Download>,
    /// The sequence of JAR libraries to include in the class path when running the
    /// version, the order of libraries should be respected in the class path (for
    /// some corner cases with mod loaders).
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,
    /// The full class name to run as the main JVM class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    /// Legacy arguments command line, whitespace-split into game arguments.
    #[serde(rename = "minecraftArguments")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_arguments: Option<String>,
    /// Modern arguments for game and/or jvm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<VersionArguments>,
    /// Logging configuration.
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub logging: HashMap<String, VersionLogging>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Release,
    Snapshot,
    OldBeta,
    OldAlpha,
    /// Anything else, typically locally installed modded versions.
    #[serde(other)]
    Modded,
}

impl VersionType {

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::Release => "release",
            VersionType::Snapshot => "snapshot",
            VersionType::OldBeta => "old_beta",
            VersionType::OldAlpha => "old_alpha",
            VersionType::Modded => "modded",
        }
    }

}

/// Object describing the Mojang-provided Java version to use to launch the game.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersion {
    pub component: Option<String>,
    pub major_version: u32,
}

/// Describe the asset index to use and how to download it when missing.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionAssetIndex {
    pub id: String,
    pub total_size: Option<u32>,
    #[serde(flatten)]
    pub download: Download,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub name: Gav,
    #[serde(default)]
    #[serde(skip_serializing_if = "LibraryDownloads::is_empty")]
    pub downloads: LibraryDownloads,
    /// Mapping from OS name to the natives classifier to use on that OS, the
    /// classifier may contain a `${arch}` pattern replaced by the host bit-ness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
    /// Extraction options for natives libraries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<LibraryExtract>,
    /// Base URL of a maven repository to derive the download URL from when no
    /// explicit download information is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryDownload>,
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub classifiers: HashMap<String, LibraryDownload>,
}

impl LibraryDownloads {
    fn is_empty(&self) -> bool {
        self.artifact.is_none() && self.classifiers.is_empty()
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDownload {
    /// Path of the artifact relative to the libraries directory, derived from the
    /// library GAV when absent.
    pub path: Option<String>,
    #[serde(flatten)]
    pub download: Download,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LibraryExtract {
    /// Entries matching any of these path prefixes are not extracted.
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionArguments {
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub game: Vec<VersionArgument>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jvm: Vec<VersionArgument>,
}

/// An argument entry is either a literal string or a conditional object whose value
/// is only included when its rules evaluate to ALLOW.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum VersionArgument {
    Raw(String),
    Conditional(ConditionalArgument),
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalArgument {
    pub value: SingleOrVec<String>,
    pub rules: Option<Vec<Rule>>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionLogging {
    #[serde(default)]
    pub r#type: VersionLoggingType,
    pub argument: String,
    pub file: VersionLoggingFile,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionLoggingType {
    #[default]
    #[serde(rename = "log4j2-xml")]
    Log4j2Xml,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionLoggingFile {
    pub id: String,
    #[serde(flatten)]
    pub download: Download,
}

// ================== //
//    ASSET INDEX     //
// ================== //

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct AssetIndex {
    /// For version <= 13w23b (1.6.1), objects are copied to `resources` in the
    /// game's working directory.
    #[serde(default)]
    pub map_to_resources: bool,
    /// For 13w23b (1.6.1) < version <= 13w48b (1.7.2), objects are copied to the
    /// index' virtual directory.
    #[serde(default)]
    pub r#virtual: bool,
    /// Mapping of assets from their logical path to their hash and size.
    pub objects: HashMap<String, AssetObject>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct AssetObject {
    pub size: u32,
    pub hash: Sha1Hash,
}

// ================== //
//       COMMON       //
// ================== //

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: RuleOs,
    #[serde(default)]
    pub features: HashMap<String, bool>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RuleOs {
    pub name: Option<String>,
    pub arch: Option<String>,
    /// Only known value to use regex.
    pub version: Option<RegexString>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Disallow,
}

/// Download information shared by most manifests, the hash and size are verified
/// after download when present.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct Download {
    pub url: String,
    pub size: Option<u32>,
    pub sha1: Option<Sha1Hash>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum SingleOrVec<T> {
    Single(T),
    Vec(Vec<T>),
}

/// Internal parsing function for optional RFC 3339 date times, it appears that some
/// mod loader installers write malformed times missing the timezone, for example
/// "2024-12-09T23:22:49.408008176", so a 'Z' suffix is retried before giving up.
fn deserialize_date_time_chill<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: serde::Deserializer<'de>,
{

    use chrono::format::ParseErrorKind;

    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {

        type Value = Option<DateTime<FixedOffset>>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an RFC 3339 formatted date and time string")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_str(self)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match DateTime::parse_from_rfc3339(v) {
                Ok(date) => Ok(Some(date)),
                Err(e) if e.kind() == ParseErrorKind::TooShort => {
                    let mut buf = v.to_string();
                    buf.push('Z');
                    DateTime::parse_from_rfc3339(&buf).map(Some).map_err(|e| E::custom(e))
                }
                Err(e) => Err(E::custom(e)),
            }
        }

    }

    deserializer.deserialize_option(Visitor)

}
