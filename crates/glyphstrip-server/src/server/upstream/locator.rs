use crate::server::config::ServiceEndpoints;
use glyphstrip_core::{Error, Result, ServiceCategory};
use reqwest::Url;
use std::collections::HashMap;

/// Default base URL of the letter service.
pub const DEFAULT_LETTER_SERVICE_URL: &str = "http://letter-service";
/// Default base URL of the digit service.
pub const DEFAULT_NUMBER_SERVICE_URL: &str = "http://number-service";
/// Default base URL of the special character service.
pub const DEFAULT_SPECIAL_CHAR_SERVICE_URL: &str = "http://special-char-service";
/// Default base URL of the compositor.
pub const DEFAULT_COMPOSITOR_SERVICE_URL: &str = "http://compositor";

const fn default_url(category: ServiceCategory) -> &'static str {
    match category {
        ServiceCategory::Letter => DEFAULT_LETTER_SERVICE_URL,
        ServiceCategory::Digit => DEFAULT_NUMBER_SERVICE_URL,
        ServiceCategory::Special => DEFAULT_SPECIAL_CHAR_SERVICE_URL,
    }
}

fn parse_default(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Configuration {
        reason: format!("default address `{raw}` is invalid: {e}"),
    })
}

/// Read-only table from category to base URL.
///
/// Built once at startup: an explicitly configured address wins, otherwise the
/// documented default for the category is used.
#[derive(Debug, Clone)]
pub struct ServiceLocator {
    services: HashMap<ServiceCategory, Url>,
    compositor: Url,
}

impl ServiceLocator {
    pub fn new(endpoints: &ServiceEndpoints) -> Result<Self> {
        let mut services = HashMap::with_capacity(ServiceCategory::ALL.len());
        for category in ServiceCategory::ALL {
            let explicit = match category {
                ServiceCategory::Letter => endpoints.letter.as_ref(),
                ServiceCategory::Digit => endpoints.digit.as_ref(),
                ServiceCategory::Special => endpoints.special.as_ref(),
            };
            let url = match explicit {
                Some(url) => url.clone(),
                None => parse_default(default_url(category))?,
            };
            services.insert(category, url);
        }

        let compositor = match &endpoints.compositor {
            Some(url) => url.clone(),
            None => parse_default(DEFAULT_COMPOSITOR_SERVICE_URL)?,
        };

        Ok(Self {
            services,
            compositor,
        })
    }

    /// Base URL of the service rendering `category`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the table has no entry for the category.
    /// `new` fills every category, so this only guards against a table built
    /// some other way.
    pub fn resolve(&self, category: ServiceCategory) -> Result<&Url> {
        self.services
            .get(&category)
            .ok_or_else(|| Error::Configuration {
                reason: format!("no service address configured for category `{category}`"),
            })
    }

    pub fn compositor(&self) -> &Url {
        &self.compositor
    }
}
