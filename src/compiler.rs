//! Compilation of parsed zoneinfo data.
//!
//! A [`CompilationSession`] accumulates the rule sets, zones, and links of
//! every source parsed into it. Compiling the session resolves each zone
//! through a [`TransitionBuilder`], verifies the result, resolves links, and
//! optionally writes everything to a [`CompiledOutput`].

use core::{convert::Infallible, fmt};

use alloc::{borrow::ToOwned, collections::BTreeMap, string::String, vec::Vec};

use hashbrown::HashMap;

use crate::{
    alias_index::{write_alias_index, AliasIndexError},
    builder::{TransitionBuilder, ZoneBuilder},
    compiled::{CompiledTimeZone, CompiledZone, ZoneCodecError},
    parser::{ZoneInfoParseError, ZoneInfoParser},
    rule::RuleSet,
    verify::{verify_zone, VerificationFailure},
    zone::{UnresolvedRules, ZoneRecord},
};

#[cfg(feature = "std")]
use crate::{ZoneInfoError, ZONEINFO_FILES};

#[cfg(feature = "std")]
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// The name of the alias index written next to the compiled zones.
pub const ALIAS_INDEX_FILE: &str = "ZoneInfoMap";

/// A non-fatal problem found while parsing or compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A line that is not a `Rule`, `Zone`, `Link`, or continuation line.
    UnknownLine { line: u32, text: String },
    /// A continuation line after a zone era without an `[UNTIL]` column was
    /// skipped.
    UnexpectedContinuation { line: u32, zone: String },
    /// The zone was dropped because it refers to a missing rule set.
    UnresolvedRules(UnresolvedRules),
    /// The zone was dropped because it failed verification.
    VerificationFailed {
        zone: String,
        failure: VerificationFailure,
    },
    /// No zone named `target` exists for `alias` to link to.
    UnresolvedLink { target: String, alias: String },
    /// The compiled zone could not be encoded and was not written.
    EncodeFailed { zone: String, error: ZoneCodecError },
    /// The written zone did not read back equal to the compiled zone.
    ReadBackMismatch { zone: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLine { line, text } => {
                write!(f, "line {line}: unknown line \"{text}\"")
            }
            Self::UnexpectedContinuation { line, zone } => {
                write!(f, "line {line}: ignoring continuation of closed zone {zone}")
            }
            Self::UnresolvedRules(e) => write!(f, "{e}"),
            Self::VerificationFailed { zone, failure } => {
                write!(f, "zone {zone} failed verification: {failure}")
            }
            Self::UnresolvedLink { target, alias } => write!(
                f,
                "cannot find time zone \"{target}\" to link alias \"{alias}\" to"
            ),
            Self::EncodeFailed { zone, error } => write!(f, "cannot encode zone {zone}: {error}"),
            Self::ReadBackMismatch { zone } => {
                write!(f, "zone {zone} did not read back from its written form")
            }
        }
    }
}

/// A fatal error while writing compiled output.
#[derive(Debug)]
pub enum CompileError<E> {
    Output(E),
    AliasIndex(AliasIndexError),
}

impl<E: fmt::Display> fmt::Display for CompileError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(e) => write!(f, "cannot write compiled output: {e}"),
            Self::AliasIndex(e) => write!(f, "cannot build the zone index: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for CompileError<E> {}

/// A destination for compiled zones and the alias index.
pub trait CompiledOutput {
    type Error;

    fn write_zone(&mut self, id: &str, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reads back the bytes last written for `id`.
    fn read_zone(&mut self, id: &str) -> Result<Vec<u8>, Self::Error>;

    fn write_alias_index(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Keeps compiled output in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryOutput {
    pub zones: BTreeMap<String, Vec<u8>>,
    pub alias_index: Option<Vec<u8>>,
}

impl CompiledOutput for MemoryOutput {
    type Error = Infallible;

    fn write_zone(&mut self, id: &str, bytes: &[u8]) -> Result<(), Infallible> {
        self.zones.insert(id.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn read_zone(&mut self, id: &str) -> Result<Vec<u8>, Infallible> {
        Ok(self.zones.get(id).cloned().unwrap_or_default())
    }

    fn write_alias_index(&mut self, bytes: &[u8]) -> Result<(), Infallible> {
        self.alias_index = Some(bytes.to_vec());
        Ok(())
    }
}

/// Writes one file per zone into a directory.
///
/// Zone ids containing `/` are written into subdirectories, and the alias
/// index is written to [`ALIAS_INDEX_FILE`].
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct DirectoryOutput {
    dir: PathBuf,
}

#[cfg(feature = "std")]
impl DirectoryOutput {
    /// Fails when `dir` does not exist or is not a directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                std::format!("destination directory doesn't exist: {}", dir.display()),
            ));
        }
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                std::format!("destination is not a directory: {}", dir.display()),
            ));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)
    }
}

#[cfg(feature = "std")]
impl CompiledOutput for DirectoryOutput {
    type Error = io::Error;

    fn write_zone(&mut self, id: &str, bytes: &[u8]) -> io::Result<()> {
        self.write_file(id, bytes)
    }

    fn read_zone(&mut self, id: &str) -> io::Result<Vec<u8>> {
        fs::read(self.dir.join(id))
    }

    fn write_alias_index(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_file(ALIAS_INDEX_FILE, bytes)
    }
}

/// The outcome of compiling a [`CompilationSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation<Z> {
    zones: BTreeMap<String, Z>,
    ids: BTreeMap<String, String>,
    diagnostics: Vec<Diagnostic>,
}

impl<Z> Compilation<Z> {
    /// Every zone that compiled and passed verification, by id.
    pub fn zones(&self) -> &BTreeMap<String, Z> {
        &self.zones
    }

    /// Maps every zone id and resolved alias to the id of its compiled zone.
    pub fn ids(&self) -> &BTreeMap<String, String> {
        &self.ids
    }

    /// Diagnostics from parsing and compiling, in the order they were found.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Looks up a compiled zone by id or alias.
    pub fn get(&self, id: &str) -> Option<&Z> {
        self.ids.get(id).and_then(|canonical| self.zones.get(canonical))
    }

    /// Encodes the alias index.
    ///
    /// Ids differing only in ASCII case are written once: the first id in
    /// order is kept and mapped to the target of the last.
    pub fn alias_index(&self) -> Result<Vec<u8>, AliasIndexError> {
        let mut folded: BTreeMap<String, (&str, &str)> = BTreeMap::new();
        for (id, target) in &self.ids {
            folded
                .entry(id.to_ascii_lowercase())
                .and_modify(|entry| entry.1 = target.as_str())
                .or_insert((id.as_str(), target.as_str()));
        }
        write_alias_index(folded.into_values())
    }
}

/// The rule sets, zones, and links gathered from one or more sources.
#[derive(Debug, Clone, Default)]
pub struct CompilationSession {
    pub(crate) rule_sets: HashMap<String, RuleSet>,
    pub(crate) zones: Vec<ZoneRecord>,
    pub(crate) links: Vec<(String, String)>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

// ==== CompilationSession parsing methods ====

impl CompilationSession {
    /// Parses a zoneinfo source into this session.
    pub fn parse_str(&mut self, source: &str) -> Result<(), ZoneInfoParseError> {
        ZoneInfoParser::from_zoneinfo_str(source).parse_into(self)
    }

    /// Parses a zoneinfo file into this session.
    #[cfg(feature = "std")]
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ZoneInfoError> {
        let source = fs::read_to_string(path)?;
        self.parse_str(&source).map_err(ZoneInfoError::Parse)
    }

    /// Parses the well known zoneinfo files of a "tzdata" directory.
    #[cfg(feature = "std")]
    pub fn from_zoneinfo_directory<P: AsRef<Path>>(dir: P) -> Result<Self, ZoneInfoError> {
        let mut session = Self::default();
        for filename in ZONEINFO_FILES {
            session.parse_file(dir.as_ref().join(filename))?;
        }
        Ok(session)
    }

    pub fn rule_sets(&self) -> &HashMap<String, RuleSet> {
        &self.rule_sets
    }

    /// Zones in the order they were parsed.
    pub fn zones(&self) -> &[ZoneRecord] {
        &self.zones
    }

    /// `(target, alias)` pairs in the order they were parsed.
    pub fn links(&self) -> &[(String, String)] {
        &self.links
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

// ==== CompilationSession compile methods ====

impl CompilationSession {
    /// Compiles every zone with the default [`ZoneBuilder`].
    pub fn compile(&self) -> Compilation<CompiledTimeZone> {
        self.compile_with::<ZoneBuilder>()
    }

    /// Compiles every zone with a fresh `B` per zone.
    pub fn compile_with<B: TransitionBuilder>(&self) -> Compilation<B::Zone> {
        match self.compile_zones::<B, MemoryOutput>(None) {
            Ok(compilation) => compilation,
            Err(never) => match never {},
        }
    }

    /// Compiles every zone, writing each zone that passes verification and
    /// then the alias index to `output`.
    pub fn compile_into<B: TransitionBuilder, O: CompiledOutput>(
        &self,
        output: &mut O,
    ) -> Result<Compilation<B::Zone>, CompileError<O::Error>> {
        let compilation = self
            .compile_zones::<B, O>(Some(&mut *output))
            .map_err(CompileError::Output)?;
        log::info!("Writing {ALIAS_INDEX_FILE}");
        let index = compilation.alias_index()?;
        output
            .write_alias_index(&index)
            .map_err(CompileError::Output)?;
        Ok(compilation)
    }

    /// Compiles every zone into `dir`, which must already exist.
    #[cfg(feature = "std")]
    pub fn compile_to_directory<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Compilation<CompiledTimeZone>, ZoneInfoError> {
        let mut output = DirectoryOutput::new(dir)?;
        Ok(self.compile_into::<ZoneBuilder, _>(&mut output)?)
    }

    fn compile_zones<B: TransitionBuilder, O: CompiledOutput>(
        &self,
        mut output: Option<&mut O>,
    ) -> Result<Compilation<B::Zone>, O::Error> {
        let mut diagnostics = self.diagnostics.clone();
        let mut report = |diagnostic: Diagnostic| {
            log::warn!("{diagnostic}");
            diagnostics.push(diagnostic);
        };

        let mut zones = BTreeMap::new();
        for record in &self.zones {
            let id = record.name();
            let mut builder = B::default();
            if let Err(e) = record.add_to_builder(&mut builder, &self.rule_sets) {
                report(e.into());
                continue;
            }
            let zone = builder.to_compiled_zone(id);
            if let Err(failure) = verify_zone(id, &zone) {
                report(Diagnostic::VerificationFailed {
                    zone: id.to_owned(),
                    failure,
                });
                continue;
            }
            if let Some(output) = output.as_deref_mut() {
                log::info!("Writing {id}");
                match builder.persist(id) {
                    Ok(bytes) => {
                        output.write_zone(id, &bytes)?;
                        let read_back = output.read_zone(id)?;
                        if B::load_from(&read_back, id).ok().as_ref() != Some(&zone) {
                            report(Diagnostic::ReadBackMismatch {
                                zone: id.to_owned(),
                            });
                        }
                    }
                    Err(error) => report(Diagnostic::EncodeFailed {
                        zone: id.to_owned(),
                        error,
                    }),
                }
            }
            zones.insert(id.to_owned(), zone);
        }

        let mut ids = zones
            .values()
            .map(|zone| (zone.id().to_owned(), zone.id().to_owned()))
            .collect::<BTreeMap<_, _>>();
        for pass in 0..2 {
            let patch = self.resolve_links(&ids, |target, alias| {
                if pass > 0 {
                    report(Diagnostic::UnresolvedLink {
                        target: target.to_owned(),
                        alias: alias.to_owned(),
                    });
                }
            });
            ids.extend(patch);
        }

        Ok(Compilation {
            zones,
            ids,
            diagnostics,
        })
    }

    /// Resolves each link against `ids`, returning the new alias mappings.
    ///
    /// Later links to the same alias win.
    fn resolve_links(
        &self,
        ids: &BTreeMap<String, String>,
        mut unresolved: impl FnMut(&str, &str),
    ) -> BTreeMap<String, String> {
        let mut patch = BTreeMap::new();
        for (target, alias) in &self.links {
            match ids.get(target) {
                Some(canonical) => {
                    patch.insert(alias.clone(), canonical.clone());
                }
                None => unresolved(target, alias),
            }
        }
        patch
    }
}

impl From<UnresolvedRules> for Diagnostic {
    fn from(value: UnresolvedRules) -> Self {
        Self::UnresolvedRules(value)
    }
}

impl<E> From<AliasIndexError> for CompileError<E> {
    fn from(value: AliasIndexError) -> Self {
        Self::AliasIndex(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias_index::read_alias_index;
    use alloc::vec;

    fn session(source: &str) -> CompilationSession {
        let mut session = CompilationSession::default();
        session.parse_str(source).unwrap();
        session
    }

    #[test]
    fn bounded_rules_then_fixed_era() {
        let compilation = session(
            "Rule Test 1996 2000 - Oct lastSun 2:00 0 S\n\
             Zone Test/Zone 1:00 Test TST 2000\n\
             \t\t1:00 - TST\n",
        )
        .compile();
        assert!(compilation.diagnostics().is_empty());
        assert_eq!(
            compilation.get("Test/Zone"),
            Some(&CompiledTimeZone::fixed("Test/Zone", "TST", 3_600_000, 3_600_000))
        );
    }

    #[test]
    fn links_resolve_to_canonical_zone() {
        let compilation = session(
            "Link Europe/Belfast Europe/Ulster\n\
             Link Europe/London Europe/Belfast\n\
             Zone Europe/London 0:00 - GMT\n",
        )
        .compile();
        assert!(compilation.diagnostics().is_empty());
        assert_eq!(compilation.zones().len(), 1);
        assert_eq!(compilation.ids()["Europe/Belfast"], "Europe/London");
        assert_eq!(compilation.ids()["Europe/Ulster"], "Europe/London");
        assert_eq!(
            compilation.get("Europe/Ulster"),
            compilation.get("Europe/London")
        );
    }

    #[test]
    fn unresolved_link_is_reported_once() {
        let compilation = session("Link Europe/London Europe/Belfast\n").compile();
        assert_eq!(
            compilation.diagnostics(),
            [Diagnostic::UnresolvedLink {
                target: "Europe/London".to_owned(),
                alias: "Europe/Belfast".to_owned()
            }]
        );
        assert!(compilation.ids().is_empty());
        assert!(compilation.get("Europe/Belfast").is_none());
    }

    #[test]
    fn missing_rule_set_drops_only_that_zone() {
        let compilation = session(
            "Zone Test/Missing 1:00 Nope T%sT\n\
             Zone Etc/UTC 0 - UTC\n",
        )
        .compile();
        assert_eq!(
            compilation.diagnostics(),
            [Diagnostic::UnresolvedRules(UnresolvedRules {
                zone: "Test/Missing".to_owned(),
                rules: "Nope".to_owned()
            })]
        );
        assert!(compilation.get("Test/Missing").is_none());
        assert!(compilation.get("Etc/UTC").is_some());
    }

    #[test]
    fn failed_verification_drops_zone() {
        let compilation = session(
            "Zone Test/Short 1:00 - XXX 1900\n\
             \t2:00 - YY\n",
        )
        .compile();
        assert!(compilation.zones().is_empty());
        assert!(matches!(
            compilation.diagnostics(),
            [Diagnostic::VerificationFailed {
                zone,
                failure: VerificationFailure::InvalidNameKey { .. }
            }] if zone == "Test/Short"
        ));
    }

    #[test]
    fn parse_diagnostics_are_carried() {
        let source = "Leap 2016 Dec 31 23:59:60 + S\nZone Etc/UTC 0 - UTC\n";
        let compilation = session(source).compile();
        assert!(matches!(
            compilation.diagnostics(),
            [Diagnostic::UnknownLine { line: 1, .. }]
        ));
    }

    #[test]
    fn compile_into_memory() {
        let session = session(
            "Zone Etc/UTC 0 - UTC\n\
             Zone Test/EST -5:00 - EST\n\
             Link Etc/UTC Etc/Zulu\n",
        );
        let mut output = MemoryOutput::default();
        let compilation = session
            .compile_into::<ZoneBuilder, _>(&mut output)
            .unwrap();
        assert!(compilation.diagnostics().is_empty());
        assert_eq!(
            output.zones.keys().map(String::as_str).collect::<Vec<_>>(),
            ["Etc/UTC", "Test/EST"]
        );
        assert_eq!(
            ZoneBuilder::load_from(&output.zones["Test/EST"], "Test/EST").unwrap(),
            compilation.zones()["Test/EST"]
        );
        let index = read_alias_index(output.alias_index.as_deref().unwrap()).unwrap();
        assert_eq!(&index, compilation.ids());
        assert_eq!(index["Etc/Zulu"], "Etc/UTC");
    }

    #[test]
    fn alias_index_folds_case() {
        let compilation = session("Zone Etc/UTC 0 - UTC\nLink Etc/UTC etc/utc\n").compile();
        assert_eq!(compilation.ids().len(), 2);
        let index = read_alias_index(&compilation.alias_index().unwrap()).unwrap();
        assert_eq!(
            index.into_iter().collect::<Vec<_>>(),
            vec![("Etc/UTC".to_owned(), "Etc/UTC".to_owned())]
        );
    }

    /// Drops the last byte of every zone it reads back.
    #[derive(Default)]
    struct Truncating(MemoryOutput);

    impl CompiledOutput for Truncating {
        type Error = Infallible;

        fn write_zone(&mut self, id: &str, bytes: &[u8]) -> Result<(), Infallible> {
            self.0.write_zone(id, bytes)
        }

        fn read_zone(&mut self, id: &str) -> Result<Vec<u8>, Infallible> {
            let mut bytes = self.0.read_zone(id)?;
            bytes.pop();
            Ok(bytes)
        }

        fn write_alias_index(&mut self, bytes: &[u8]) -> Result<(), Infallible> {
            self.0.write_alias_index(bytes)
        }
    }

    #[test]
    fn read_back_mismatch_is_not_fatal() {
        let mut output = Truncating::default();
        let compilation = session("Zone Etc/UTC 0 - UTC\n")
            .compile_into::<ZoneBuilder, _>(&mut output)
            .unwrap();
        assert_eq!(
            compilation.diagnostics(),
            [Diagnostic::ReadBackMismatch {
                zone: "Etc/UTC".to_owned()
            }]
        );
        assert!(compilation.get("Etc/UTC").is_some());
        assert!(output.0.alias_index.is_some());
    }
}
