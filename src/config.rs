// Run configuration: TOML file values, then command line overrides.
//
// Lookup order for the file is an explicit `--config` path (must exist),
// then `<config dir>/card-publisher/config.toml` if present, then the
// built-in defaults.

use crate::error::{Error, Result};
use crate::profile::{Columns, FieldMapping, ProfileKind, ProfileOptions};
use crate::session::RefreshPolicy;
use crate::throttle::Throttle;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://swag.swarsel.win";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub profile: ProfileKind,
    /// Collection or wishlist URL, IRI or UUID.
    pub target: Option<String>,
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub image_dir: PathBuf,
    pub credentials: PathBuf,
    pub visibility: String,
    pub currency: String,
    pub search_url_template: Option<String>,
    pub session: SessionSettings,
    pub throttle: ThrottleSettings,
    pub columns: ColumnOverrides,
    pub fields: Option<Vec<FieldMapping>>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 30,
            profile: ProfileKind::Item,
            target: None,
            input: None,
            output: PathBuf::from("posted_cards.csv"),
            image_dir: PathBuf::from("image"),
            credentials: PathBuf::from("credentials.txt"),
            visibility: "public".into(),
            currency: "EUR".into(),
            search_url_template: None,
            session: SessionSettings::default(),
            throttle: ThrottleSettings::default(),
            columns: ColumnOverrides::default(),
            fields: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Published rows per token; `0` disables the count limit.
    pub refresh_every: usize,
    pub token_ttl_secs: Option<u64>,
    pub refresh_on_unauthorized: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            refresh_every: 20,
            token_ttl_secs: None,
            refresh_on_unauthorized: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleSettings {
    /// Rows per second; `0` disables throttling.
    pub per_second: f64,
    pub burst: u32,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        ThrottleSettings {
            per_second: 1.0,
            burst: 1,
        }
    }
}

/// Per-column header overrides on top of the profile's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnOverrides {
    pub name: Option<String>,
    pub image: Option<String>,
    pub url: Option<String>,
    pub price: Option<String>,
    pub identifier: Option<String>,
    pub rarity: Option<String>,
    pub description: Option<String>,
}

impl ColumnOverrides {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.image.is_none()
            && self.url.is_none()
            && self.price.is_none()
            && self.identifier.is_none()
            && self.rarity.is_none()
            && self.description.is_none()
    }

    fn apply(&self, mut columns: Columns) -> Columns {
        if let Some(v) = &self.name {
            columns.name = v.clone();
        }
        if let Some(v) = &self.image {
            columns.image = v.clone();
        }
        if let Some(v) = &self.url {
            columns.url = Some(v.clone());
        }
        if let Some(v) = &self.price {
            columns.price = Some(v.clone());
        }
        if let Some(v) = &self.identifier {
            columns.identifier = v.clone();
        }
        if let Some(v) = &self.rarity {
            columns.rarity = v.clone();
        }
        if let Some(v) = &self.description {
            columns.description = v.clone();
        }
        columns
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub profile: Option<ProfileKind>,
    pub target: Option<String>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
    pub credentials: Option<PathBuf>,
}

impl Settings {
    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Settings::default(),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        let Overrides {
            base_url,
            profile,
            target,
            input,
            output,
            image_dir,
            credentials,
        } = overrides;
        if let Some(v) = base_url {
            self.base_url = v;
        }
        if let Some(v) = profile {
            self.profile = v;
        }
        if target.is_some() {
            self.target = target;
        }
        if input.is_some() {
            self.input = input;
        }
        if let Some(v) = output {
            self.output = v;
        }
        if let Some(v) = image_dir {
            self.image_dir = v;
        }
        if let Some(v) = credentials {
            self.credentials = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Configuration(format!("invalid base_url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "base_url must be http or https, got {:?}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Configuration("timeout_secs must be at least 1".into()));
        }
        let rate = self.throttle.per_second;
        if !rate.is_finite() || rate < 0.0 {
            return Err(Error::Configuration(format!(
                "throttle.per_second must be a non-negative number, got {rate}"
            )));
        }
        if self.throttle.burst == 0 {
            return Err(Error::Configuration("throttle.burst must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            every: Some(self.session.refresh_every).filter(|n| *n > 0),
            max_age: self.session.token_ttl_secs.map(Duration::from_secs),
            on_unauthorized: self.session.refresh_on_unauthorized,
        }
    }

    pub fn throttle(&self) -> Throttle {
        Throttle::new(self.throttle.per_second, self.throttle.burst)
    }

    pub fn profile_options(&self) -> ProfileOptions {
        let columns = if self.columns.is_empty() {
            None
        } else {
            let base = match self.profile {
                ProfileKind::Wish => Columns::shop_listing(),
                ProfileKind::Item | ProfileKind::CardWish => Columns::card_list(),
            };
            Some(self.columns.apply(base))
        };
        ProfileOptions {
            visibility: self.visibility.clone(),
            currency: self.currency.clone(),
            search_url_template: self.search_url_template.clone(),
            columns,
            fields: self.fields.clone(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("card-publisher").join("config.toml"))
}
