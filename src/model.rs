// src/model.rs

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A repository found by discovery. Identity is the full name (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub full_name: String,
    pub owner: String,
    pub name: String,
    /// Web URL, also used as the clone URL
    pub url: String,
}

/// Usage of one tracked command by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandUsage {
    pub command: String,
    pub count: u64,
    #[serde(default)]
    pub average_frequency: f64,
}

/// Command hits of one calendar year, bucketed by month (1-12).
///
/// Serialized flat, the way the result document has always looked:
/// `{"3": 2, "7": 1, "total": 3, "loc": 120}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearActivity {
    pub months: BTreeMap<u32, u64>,
    pub total: u64,
    /// Touched lines attributed to this year
    pub loc: u64,
}

/// Per-year activity of one user plus the running total of command hits.
///
/// Serialized as `{"2021": {..}, "2022": {..}, "total": 17}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Years {
    pub by_year: BTreeMap<i32, YearActivity>,
    pub total: u64,
}

impl Years {
    pub fn record_hit(&mut self, year: i32, month: u32) {
        let activity = self.by_year.entry(year).or_default();
        *activity.months.entry(month).or_insert(0) += 1;
        activity.total += 1;
        self.total += 1;
    }

    pub fn record_loc(&mut self, year: i32, loc: u64) {
        self.by_year.entry(year).or_default().loc += loc;
    }

    pub fn merge(&mut self, other: &Years) {
        for (year, theirs) in &other.by_year {
            let ours = self.by_year.entry(*year).or_default();
            for (month, count) in &theirs.months {
                *ours.months.entry(*month).or_insert(0) += count;
            }
            ours.total += theirs.total;
            ours.loc += theirs.loc;
        }
        self.total += other.total;
    }
}

/// Everything known about one author email
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    pub email: String,
    pub loc: u64,
    pub commands: Vec<CommandUsage>,
    pub years: Years,
    pub repo_count: u32,
    pub average_coverage: f64,
    pub average_frequency: f64,
}

impl UserRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn command(&self, command: &str) -> Option<&CommandUsage> {
        self.commands.iter().find(|c| c.command == command)
    }

    fn add_command_count(&mut self, command: &str, count: u64) {
        match self.commands.iter_mut().find(|c| c.command == command) {
            Some(usage) => usage.count += count,
            None => self.commands.push(CommandUsage {
                command: command.to_string(),
                count,
                average_frequency: 0.0,
            }),
        }
    }

    /// One occurrence of `command` in a line added at `year`/`month`
    pub fn record_command(&mut self, command: &str, year: i32, month: u32) {
        self.add_command_count(command, 1);
        self.years.record_hit(year, month);
    }

    pub fn record_loc(&mut self, loc: u64, year: i32) {
        self.loc += loc;
        self.years.record_loc(year, loc);
    }

    /// Adds the raw counters of `other` (same email) into this record.
    pub fn merge(&mut self, other: &UserRecord) {
        self.loc += other.loc;
        for usage in &other.commands {
            self.add_command_count(&usage.command, usage.count);
        }
        self.years.merge(&other.years);
        self.repo_count += other.repo_count;
    }

    pub fn total_hits(&self) -> u64 {
        self.commands.iter().map(|c| c.count).sum()
    }
}

/// Population-wide figures for one tracked command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub command: String,
    pub count: u64,
    pub average_usage: f64,
    pub average_frequency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub total: u64,
    pub count_users: u64,
    pub average_usage: f64,
}

/// The persisted document for one framework
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub framework: String,
    pub users: Vec<UserRecord>,
    /// Adopting repositories seen in the population pass
    pub repo_count: u64,
    /// Adopting repositories seen in the per-user pass
    pub users_repo_count: u64,
    pub users_count: u64,
    pub commands: Vec<CommandSummary>,
    pub years: BTreeMap<i32, YearSummary>,
    pub average_coverage: f64,
    pub average_frequency: f64,
    pub average_loc: f64,
    pub language: String,
    pub extensions: Vec<String>,
    pub framework_file: String,
    pub repositories: Vec<Repository>,
}

impl AnalysisResult {
    pub fn new(framework: impl Into<String>) -> Self {
        Self {
            framework: framework.into(),
            ..Default::default()
        }
    }

    pub fn user(&self, email: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn user_mut(&mut self, email: &str) -> Option<&mut UserRecord> {
        self.users.iter_mut().find(|u| u.email == email)
    }

    /// Folds per-user counters gathered elsewhere (one repository scan) into
    /// this result. Users keep their first-seen order.
    pub fn absorb(&mut self, users: Vec<UserRecord>) {
        for incoming in users {
            match self.user_mut(&incoming.email) {
                Some(existing) => existing.merge(&incoming),
                None => self.users.push(incoming),
            }
        }
    }
}

impl Serialize for YearActivity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.months.len() + 2))?;
        for (month, count) in &self.months {
            map.serialize_entry(&month.to_string(), count)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.serialize_entry("loc", &self.loc)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for YearActivity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ActivityVisitor;

        impl<'de> Visitor<'de> for ActivityVisitor {
            type Value = YearActivity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of month counts with `total` and `loc`")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<YearActivity, A::Error> {
                let mut activity = YearActivity::default();
                while let Some(key) = access.next_key::<String>()? {
                    match key.as_str() {
                        "total" => activity.total = access.next_value()?,
                        "loc" => activity.loc = access.next_value()?,
                        month => {
                            let month = month
                                .parse::<u32>()
                                .map_err(|_| de::Error::custom(format!("invalid month key `{month}`")))?;
                            activity.months.insert(month, access.next_value()?);
                        }
                    }
                }
                Ok(activity)
            }
        }

        deserializer.deserialize_map(ActivityVisitor)
    }
}

impl Serialize for Years {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.by_year.len() + 1))?;
        for (year, activity) in &self.by_year {
            map.serialize_entry(&year.to_string(), activity)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Years {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct YearsVisitor;

        impl<'de> Visitor<'de> for YearsVisitor {
            type Value = Years;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of year activity with `total`")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Years, A::Error> {
                let mut years = Years::default();
                while let Some(key) = access.next_key::<String>()? {
                    if key == "total" {
                        years.total = access.next_value()?;
                        continue;
                    }
                    let year = key
                        .parse::<i32>()
                        .map_err(|_| de::Error::custom(format!("invalid year key `{key}`")))?;
                    years.by_year.insert(year, access.next_value()?);
                }
                Ok(years)
            }
        }

        deserializer.deserialize_map(YearsVisitor)
    }
}
