// Publisher: walks the records in order and turns each one into a remote
// resource.
//
// Per row: refresh the session if the policy says so, wait for the
// throttle, validate, fetch the image, create the resource, attach the
// profile's text fields, upload the image. Only a failed create drops a
// row; authentication failures end the run.

use crate::api::{CollectionApi, DataField};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::images::ImageSource;
use crate::profile::Profile;
use crate::records::CardRecord;
use crate::results::PublishResult;
use crate::session::{RefreshPolicy, Session};
use crate::throttle::Throttle;
use indicatif::ProgressBar;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Published(PublishResult),
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub published: Vec<PublishResult>,
    pub skipped: usize,
    pub failed: usize,
    pub authentications: u32,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.published.len() + self.skipped + self.failed
    }
}

pub struct Publisher<A, I> {
    api: A,
    images: I,
    profile: Profile,
    credentials: Credentials,
    policy: RefreshPolicy,
    throttle: Throttle,
    session: Option<Session>,
    authentications: u32,
    progress: Option<ProgressBar>,
}

impl<A: CollectionApi, I: ImageSource> Publisher<A, I> {
    /// A publisher with the default refresh policy and a 1 row/s throttle.
    pub fn new(api: A, images: I, profile: Profile, credentials: Credentials) -> Self {
        Publisher {
            api,
            images,
            profile,
            credentials,
            policy: RefreshPolicy::default(),
            throttle: Throttle::new(1.0, 1),
            session: None,
            authentications: 0,
            progress: None,
        }
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn images(&self) -> &I {
        &self.images
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Publish `records` in order. `on_published` sees every successful row
    /// as soon as it is done; an error from it stops the run.
    pub fn run<F>(&mut self, records: Vec<CardRecord>, mut on_published: F) -> Result<RunReport>
    where
        F: FnMut(&PublishResult) -> Result<()>,
    {
        info!("Found {} card(s) to process", records.len());
        let mut report = RunReport::default();

        for (index, mut record) in records.into_iter().enumerate() {
            let row = index + 1;
            self.ensure_session(Instant::now())?;
            self.throttle.acquire();

            match self.publish_record(row, &mut record)? {
                RowOutcome::Published(result) => {
                    on_published(&result)?;
                    report.published.push(result);
                }
                RowOutcome::Skipped => report.skipped += 1,
                RowOutcome::Failed => report.failed += 1,
            }
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        report.authentications = self.authentications;
        info!(
            published = report.published.len(),
            skipped = report.skipped,
            failed = report.failed,
            "Run finished"
        );
        Ok(report)
    }

    /// Process a single row. `Err` is reserved for failures that must end
    /// the run.
    pub fn publish_record(&mut self, row: usize, record: &mut CardRecord) -> Result<RowOutcome> {
        let (name, image_url) = match self.profile.validate(record) {
            Ok((name, image)) => (name.to_string(), image.to_string()),
            Err(e) => {
                warn!("Skipping row {}: {}", row, e);
                return Ok(RowOutcome::Skipped);
            }
        };
        if let Some(progress) = &self.progress {
            progress.set_message(name.clone());
        }

        let image_path = self.images.fetch(&image_url, &name);
        record.set_downloaded_image(image_path.clone());

        let kind = self.profile.resource();
        let payload = self.profile.payload(record);
        let mut created = self.api.create(&self.token()?, kind, &payload);
        if self.policy.on_unauthorized && created.as_ref().is_err_and(Error::is_unauthorized) {
            warn!("Token rejected while creating {}, re-authenticating", name);
            self.authenticate(Instant::now())?;
            created = self.api.create(&self.token()?, kind, &payload);
        }
        let id = match created {
            Ok(id) if !id.trim().is_empty() => id,
            Ok(_) => {
                error!("Failed to add {}: empty identifier in response", name);
                return Ok(RowOutcome::Failed);
            }
            Err(e) => {
                error!("Failed to add {}: {}", name, e);
                return Ok(RowOutcome::Failed);
            }
        };
        info!("{} added with ID: {}", name, id);

        let token = self.token()?;
        for field in self.profile.fields(record) {
            let data = DataField::text(kind.iri(&id), &field.label, &field.value, &self.profile.visibility);
            match self.api.attach_field(&token, &data) {
                Ok(field_id) => debug!("{} {:?} attached to {} as {}", field.label, field.value, id, field_id),
                Err(e) => warn!("Failed to add {} to {}: {}", field.label, name, e),
            }
        }

        match record.downloaded_image() {
            Some(path) => match self.api.upload_image(&token, kind, &id, path) {
                Ok(()) => info!("Image uploaded for {}", name),
                Err(e) => warn!("Upload failed for {}: {}", name, e),
            },
            None => warn!("No image to upload for {}", name),
        }

        if let Some(session) = self.session.as_mut() {
            session.record_publish();
        }

        Ok(RowOutcome::Published(PublishResult {
            name,
            source_url: self.profile.columns.url_of(record).to_string(),
            price: self.profile.columns.price_of(record).to_string(),
            remote_id: id,
            image_path: record
                .downloaded_image()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }))
    }

    fn ensure_session(&mut self, now: Instant) -> Result<()> {
        let stale = self
            .session
            .as_ref()
            .map_or(true, |s| s.is_stale(&self.policy, now));
        if stale {
            self.authenticate(now)?;
        }
        Ok(())
    }

    fn authenticate(&mut self, now: Instant) -> Result<()> {
        let token = self
            .api
            .authenticate(&self.credentials)
            .map_err(|e| Error::Authentication(e.to_string()))?;
        if token.trim().is_empty() {
            return Err(Error::Authentication("server returned an empty token".into()));
        }
        match self.session.as_mut() {
            Some(session) => session.renew(token, now),
            None => self.session = Some(Session::new(token, now)),
        }
        self.authentications += 1;
        info!("Authenticated as {}", self.credentials.username);
        Ok(())
    }

    fn token(&self) -> Result<String> {
        self.session
            .as_ref()
            .map(|s| s.token().to_string())
            .ok_or_else(|| Error::Authentication("no session".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResourceKind;
    use crate::profile::{CollectionRef, ProfileKind, ProfileOptions, Scope};
    use serde_json::Value;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeApi {
        auth_calls: usize,
        fail_auth: bool,
        creates: Vec<Value>,
        fields: Vec<DataField>,
        uploads: Vec<String>,
        fail_create: HashSet<String>,
        fail_labels: HashSet<String>,
        fail_uploads: bool,
        reject_first_token: bool,
    }

    impl CollectionApi for FakeApi {
        fn authenticate(&mut self, _credentials: &Credentials) -> Result<String> {
            self.auth_calls += 1;
            if self.fail_auth {
                return Err(Error::transport("authenticate", Some(401), "Invalid credentials."));
            }
            Ok(format!("token-{}", self.auth_calls))
        }

        fn create(&mut self, token: &str, _kind: ResourceKind, payload: &Value) -> Result<String> {
            if self.reject_first_token && token == "token-1" {
                return Err(Error::transport("create item", Some(401), "Expired JWT Token"));
            }
            self.creates.push(payload.clone());
            let name = payload["name"].as_str().unwrap_or_default();
            if self.fail_create.contains(name) {
                return Err(Error::transport("create item", Some(500), "boom"));
            }
            Ok(format!("id-{}", self.creates.len()))
        }

        fn attach_field(&mut self, _token: &str, field: &DataField) -> Result<String> {
            self.fields.push(field.clone());
            if self.fail_labels.contains(&field.label) {
                return Err(Error::transport("attach", Some(400), "bad field"));
            }
            Ok(format!("field-{}", self.fields.len()))
        }

        fn upload_image(&mut self, _token: &str, _kind: ResourceKind, id: &str, _path: &Path) -> Result<()> {
            self.uploads.push(id.to_string());
            if self.fail_uploads {
                return Err(Error::transport("upload image", Some(413), "too large"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeImages {
        calls: usize,
        missing: HashSet<String>,
    }

    impl ImageSource for FakeImages {
        fn fetch(&mut self, _url: &str, name: &str) -> Option<PathBuf> {
            self.calls += 1;
            if self.missing.contains(name) {
                None
            } else {
                Some(PathBuf::from(format!("image/{name}.jpg")))
            }
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "alice".into(),
            password: "pw".into(),
        }
    }

    fn item_profile() -> Profile {
        let target = CollectionRef {
            scope: Scope::Collection,
            id: "0f8fad5b-d9cb-469f-a165-70867728950e".into(),
        };
        Profile::new(ProfileKind::Item, &target, ProfileOptions::default()).unwrap()
    }

    fn card(name: &str) -> CardRecord {
        CardRecord::from_pairs([
            ("id", "SP-1"),
            ("name", name),
            ("description", "desc"),
            ("rarity", "R"),
            ("image_url", "https://img.example/1.png"),
        ])
    }

    fn publisher(api: FakeApi, images: FakeImages) -> Publisher<FakeApi, FakeImages> {
        Publisher::new(api, images, item_profile(), credentials()).with_throttle(Throttle::unlimited())
    }

    fn run(p: &mut Publisher<FakeApi, FakeImages>, records: Vec<CardRecord>) -> RunReport {
        p.run(records, |_| Ok(())).unwrap()
    }

    #[test]
    fn incomplete_rows_never_reach_create() {
        let mut p = publisher(FakeApi::default(), FakeImages::default());
        let records = vec![
            CardRecord::from_pairs([("name", ""), ("image_url", "https://img/1.png")]),
            CardRecord::from_pairs([("name", "Flower")]),
            card("Skull"),
        ];
        let report = run(&mut p, records);

        assert_eq!(report.skipped, 2);
        assert_eq!(report.published.len(), 1);
        assert_eq!(p.api().creates.len(), 1);
        assert_eq!(p.images().calls, 1);
    }

    #[test]
    fn reauthenticates_once_more_than_twenty_rows_were_published() {
        let mut p = publisher(FakeApi::default(), FakeImages::default());
        let records: Vec<_> = (0..45).map(|i| card(&format!("Card {i}"))).collect();
        let report = run(&mut p, records);

        // rows 1, 22 and 43 start with a fresh token
        assert_eq!(p.api().auth_calls, 3);
        assert_eq!(report.authentications, 3);
        let session = p.session().unwrap();
        assert_eq!(session.issue_count(), 3);
        assert_eq!(session.since_auth(), 3);
    }

    #[test]
    fn failed_create_is_not_reported_even_with_an_image() {
        let mut api = FakeApi::default();
        api.fail_create.insert("Skull".into());
        let mut p = publisher(api, FakeImages::default());
        let report = run(&mut p, vec![card("Flower"), card("Skull")]);

        assert_eq!(p.images().calls, 2);
        assert_eq!(report.failed, 1);
        let names: Vec<_> = report.published.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Flower"]);
        assert_eq!(p.api().uploads, ["id-1"]);
    }

    #[test]
    fn failed_upload_still_counts_as_published() {
        let api = FakeApi {
            fail_uploads: true,
            ..Default::default()
        };
        let mut p = publisher(api, FakeImages::default());
        let report = run(&mut p, vec![card("Flower")]);

        assert_eq!(report.published.len(), 1);
        assert_eq!(report.published[0].remote_id, "id-1");
        assert_eq!(report.published[0].image_path, "image/Flower.jpg");
    }

    #[test]
    fn missing_image_skips_only_the_upload() {
        let mut images = FakeImages::default();
        images.missing.insert("Flower".into());
        let mut p = publisher(FakeApi::default(), images);
        let report = run(&mut p, vec![card("Flower")]);

        assert_eq!(report.published.len(), 1);
        assert_eq!(report.published[0].image_path, "");
        assert!(p.api().uploads.is_empty());
    }

    #[test]
    fn each_field_is_attempted_independently() {
        let mut api = FakeApi::default();
        api.fail_labels.insert("Description".into());
        let mut p = publisher(api, FakeImages::default());
        let report = run(&mut p, vec![card("Flower")]);

        let labels: Vec<_> = p.api().fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["Set Number", "Description", "Rarity"]);
        assert!(p.api().fields.iter().all(|f| f.item == "/api/items/id-1"));
        assert_eq!(report.published.len(), 1);
    }

    #[test]
    fn unauthorized_create_refreshes_and_retries_once() {
        let api = FakeApi {
            reject_first_token: true,
            ..Default::default()
        };
        let mut p = publisher(api, FakeImages::default());
        let report = run(&mut p, vec![card("Flower"), card("Skull")]);

        assert_eq!(p.api().auth_calls, 2);
        assert_eq!(report.published.len(), 2);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn unauthorized_create_fails_row_when_refresh_disabled() {
        let api = FakeApi {
            reject_first_token: true,
            ..Default::default()
        };
        let policy = RefreshPolicy {
            on_unauthorized: false,
            ..Default::default()
        };
        let mut p = publisher(api, FakeImages::default()).with_refresh_policy(policy);
        let report = run(&mut p, vec![card("Flower")]);

        assert_eq!(p.api().auth_calls, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn authentication_failure_aborts_the_run() {
        let api = FakeApi {
            fail_auth: true,
            ..Default::default()
        };
        let mut p = publisher(api, FakeImages::default());
        let err = p.run(vec![card("Flower")], |_| Ok(())).unwrap_err();

        assert!(matches!(err, Error::Authentication(ref m) if m.contains("Invalid credentials")));
        assert!(p.api().creates.is_empty());
        assert_eq!(p.images().calls, 0);
    }

    #[test]
    fn token_age_limit_forces_refresh() {
        let policy = RefreshPolicy {
            every: None,
            max_age: Some(Duration::ZERO),
            on_unauthorized: false,
        };
        let mut p = publisher(FakeApi::default(), FakeImages::default()).with_refresh_policy(policy);
        run(&mut p, vec![card("a"), card("b"), card("c")]);
        assert_eq!(p.api().auth_calls, 3);
    }

    #[test]
    fn published_rows_are_handed_out_in_order() {
        let mut p = publisher(FakeApi::default(), FakeImages::default());
        let mut seen = Vec::new();
        p.run(vec![card("a"), card("b")], |r| {
            seen.push(r.remote_id.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, ["id-1", "id-2"]);
    }
}
