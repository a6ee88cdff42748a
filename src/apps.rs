// src/apps.rs

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Format of the start stamp embedded in log file names
pub const START_TIME_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

const NAMESPACE_WORDS: [&str; 7] = ["java", "android", "androidx", "com", "org", "kotlin", "kotlinx"];
const VARIANT_WORDS: [&str; 8] = ["debug", "release", "test", "alpha", "beta", "dev", "edition", "free"];

const BUILTIN_APPS: [(&str, &str); 42] = [
    ("Signal", "org.thoughtcrime.securesms"),
    ("MyExpenses", "org.totschnig.myexpenses.debug"),
    ("AnkiDroid", "com.ichi2.anki.debug"),
    ("SuntimesWidget", "com.forrestguice.suntimeswidget"),
    ("MoneyManagerEx", "com.money.manager.ex"),
    ("AmazeFileManager", "com.amaze.filemanager.debug"),
    ("RunnerUp", "org.runnerup.free.debug"),
    ("NewPipe", "org.schabi.newpipe.debug"),
    ("Tachiyomi", "eu.kanade.tachiyomi.debug"),
    ("K9Mail", "com.fsck.k9.debug"),
    ("AntennaPod", "de.danoeh.antennapod.debug"),
    ("Conversations", "eu.siacs.conversations"),
    ("AnyMemo", "org.liberty.android.fantastischmemodev"),
    ("Timber", "naman14.timber"),
    ("Vanilla", "ch.blinkenlights.android.vanilla"),
    ("LoopHabitTracker", "org.isoron.uhabits"),
    ("BetterBatteryStats", "com.asksven.betterbatterystats_xdaedition"),
    ("LBRY", "io.lbry.browser"),
    ("DuckDuckGo", "com.duckduckgo.mobile.android.debug"),
    ("BookCatalogue", "com.eleybourn.bookcatalogue"),
    ("CoronaWarn", "de.rki.coronawarnapp"),
    ("APhotoManager", "de.k3b.android.androFotoFinder.debug"),
    ("ConnectBot", "org.connectbot.debug"),
    ("KeePassDroid", "com.android.keepass"),
    ("Materialistic", "io.github.hidroh.materialistic"),
    ("Swiftp", "be.ppareit.swiftp_free"),
    ("Notes", "org.secuso.privacyfriendlynotes"),
    ("AlarmClock", "com.better.alarm.debug"),
    ("WhoHasMyStuff", "de.freewarepoint.whohasmystuff"),
    ("Firefox", "org.mozilla.fenix"),
    ("Wikipedia", "org.wikipedia.alpha"),
    ("Aard2", "itkach.aard2"),
    ("Diary", "org.billthefarmer.diary"),
    ("Currencies", "de.salomax.currencies.debug"),
    ("KindMind", "com.sunyata.kindmind"),
    ("CEToolbox", "com.github.cetoolbox"),
    ("ArxivExplorer", "com.gbeatty.arxiv"),
    ("TranslateYou", "com.bnyro.translate.debug"),
    ("PasswordManager", "com.ishant.passwordmanager"),
    ("WordPress", "org.wordpress.android.prealpha"),
    ("SimpleDraw", "com.simplemobiletools.draw.pro.debug"),
    ("SimpleTask", "nl.mpcjanssen.simpletask.debug"),
];

/// Read-only app name <-> package lookup, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct AppRegistry {
    packages: BTreeMap<String, String>,
}

impl AppRegistry {
    pub fn new(packages: BTreeMap<String, String>) -> Self {
        AppRegistry { packages }
    }

    /// The apps of the evaluation study.
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_APPS
                .iter()
                .map(|(app, package)| (app.to_string(), package.to_string()))
                .collect(),
        )
    }

    /// Loads a JSON object of `{ "<AppName>": "<package>" }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(serde_json::from_str(&text)?))
    }

    pub fn package_of(&self, app: &str) -> Result<&str> {
        self.packages
            .get(app)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownApp(app.to_string()))
    }

    pub fn app_of(&self, package: &str) -> Result<&str> {
        self.packages
            .iter()
            .find(|(_, p)| p.as_str() == package)
            .map(|(app, _)| app.as_str())
            .ok_or_else(|| Error::UnknownPackage(package.to_string()))
    }

    /// Code package used to recognize in-app stack frames.
    pub fn package_identifier_of(&self, app: &str) -> Result<String> {
        self.package_of(app).map(real_code_package)
    }

    pub fn apps(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

/// Strips build-variant suffixes and well-known namespace prefixes from an
/// application package, e.g. `org.totschnig.myexpenses.debug` -> `totschnig.myexpenses`.
pub fn real_code_package(raw_package: &str) -> String {
    let mut parts: Vec<&str> = raw_package.split('.').collect();

    let is_variant = |segment: Option<&&str>| {
        segment.map_or(false, |s| VARIANT_WORDS.iter().any(|w| s.contains(w)))
    };
    if is_variant(parts.last()) {
        parts.pop();
        if is_variant(parts.last()) {
            parts.pop();
        }
    }

    match parts.iter().position(|p| !NAMESPACE_WORDS.contains(p)) {
        Some(first) => parts[first..].join("."),
        None => parts.join("."),
    }
}

/// Fields carried by a logcat bug file name:
/// `Apps.<Name>_<%Y-%m-%d-%H:%M:%S>_<tag>_bug.txt`
#[derive(Debug, Clone, PartialEq)]
pub struct LogFileName {
    pub app_name: String,
    pub start_stamp: String,
    pub start_time: NaiveDateTime,
    pub tag: String,
}

impl LogFileName {
    pub fn parse(file_name: &str) -> Result<Self> {
        let bad = || Error::FileName(file_name.to_string());

        let fields: Vec<&str> = file_name.split('_').collect();
        if fields.len() < 2 {
            return Err(bad());
        }
        let app_name = fields[0].split('.').nth(1).ok_or_else(bad)?.to_string();
        let start_stamp = fields[1].to_string();
        let start_time =
            NaiveDateTime::parse_from_str(&start_stamp, START_TIME_FORMAT).map_err(|_| bad())?;
        let tag = if fields.len() > 3 {
            fields[2..fields.len() - 1].join("_")
        } else {
            String::new()
        };

        Ok(LogFileName {
            app_name,
            start_stamp,
            start_time,
            tag,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::FileName(path.display().to_string()))?;
        Self::parse(name)
    }
}

/// The run tag a bug file belongs to is the name of its directory.
pub fn tag_of_path(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn strips_variant_and_namespace() {
        assert_eq!(real_code_package("org.totschnig.myexpenses.debug"), "totschnig.myexpenses");
        assert_eq!(real_code_package("com.x.y"), "x.y");
        assert_eq!(real_code_package("org.runnerup.free.debug"), "runnerup");
        assert_eq!(real_code_package("be.ppareit.swiftp_free"), "be.ppareit");
        assert_eq!(real_code_package("com.android.keepass"), "keepass");
        assert_eq!(real_code_package("org.thoughtcrime.securesms"), "thoughtcrime.securesms");
    }

    #[test]
    fn all_namespace_words_are_kept() {
        assert_eq!(real_code_package("com.android"), "com.android");
    }

    #[test]
    fn registry_lookups() {
        let registry = AppRegistry::builtin();
        assert_eq!(registry.package_of("Notes").unwrap(), "org.secuso.privacyfriendlynotes");
        assert_eq!(registry.app_of("io.lbry.browser").unwrap(), "LBRY");
        assert_eq!(
            registry.package_identifier_of("AntennaPod").unwrap(),
            "de.danoeh.antennapod"
        );
        assert!(matches!(registry.package_of("Nope"), Err(Error::UnknownApp(_))));
    }

    #[test]
    fn parses_file_name() {
        let parsed =
            LogFileName::parse("Apps.APhotoManager_2023-06-09-23:37:44_Stoat-0609-uni-1_bug.txt")
                .unwrap();
        assert_eq!(parsed.app_name, "APhotoManager");
        assert_eq!(parsed.start_stamp, "2023-06-09-23:37:44");
        assert_eq!(parsed.start_time.month(), 6);
        assert_eq!(parsed.start_time.hour(), 23);
        assert_eq!(parsed.tag, "Stoat-0609-uni-1");
    }

    #[test]
    fn rejects_bad_file_name() {
        assert!(LogFileName::parse("notes.txt").is_err());
        assert!(LogFileName::parse("Apps.Notes_yesterday_t_bug.txt").is_err());
    }

    #[test]
    fn tag_from_directory() {
        let path = Path::new("/data/logcat_bug/ape-1/Apps.Notes_2024-01-01-00:00:00_ape-1_bug.txt");
        assert_eq!(tag_of_path(path), Some("ape-1"));
    }
}
