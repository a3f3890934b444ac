// src/writer/cloud.rs - Cloud storage segment writer
//
// Each segment is persisted in three steps against a REST-style store:
// 1. create a remote object sized for the segment
// 2. upload the segment bytes to the object's uri
// 3. commit the object's metadata (name, start, duration)
//
// The transport lives behind `ObjectStore`; this writer only sequences the
// calls and maps failures onto the writer contract.

use crate::core::segment::Segment;
use crate::core::stats::SegmentInfo;
use crate::error::WriterError;
use crate::writer::{write_failure, SegmentWriter, WriteOutcome, WriterContext, WriterEntry};
use log::{debug, warn};
use std::time::Duration;
use thiserror::Error;

const NAME: &str = "ivr_writer";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot take data right now; the segment is skipped.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store request failed: {0}")]
    Failed(String),
}

/// Parameters of the create-object request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub size: usize,
    pub start_ts: f64,
    pub duration: f64,
}

/// Object handle returned by the store's create step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub name: String,
    pub uri: String,
}

/// Transport for the three-step upload.
pub trait ObjectStore: Send {
    fn create_object(
        &mut self,
        endpoint: &str,
        request: &CreateRequest,
        timeout: Option<Duration>,
    ) -> Result<RemoteObject, StoreError>;

    fn upload(
        &mut self,
        object: &RemoteObject,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<(), StoreError>;

    fn commit(
        &mut self,
        endpoint: &str,
        object: &RemoteObject,
        segment: &SegmentInfo,
        timeout: Option<Duration>,
    ) -> Result<(), StoreError>;
}

/// REST endpoint for a destination such as `ivr://host/api/records`: the
/// scheme is replaced with `http`.
pub fn rest_endpoint(url: &str) -> Option<String> {
    let (_, rest) = url.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    Some(format!("http:{}", rest))
}

pub struct CloudWriter<S> {
    store: S,
    endpoint: Option<String>,
}

impl<S: ObjectStore> CloudWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            endpoint: None,
        }
    }

    /// Registry entry for the `ivr` scheme; `make_store` builds one transport
    /// per recording.
    pub fn entry<F>(make_store: F) -> WriterEntry
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: 'static,
    {
        WriterEntry::new(NAME, "Cloud storage segment writer", &["ivr"], move || {
            CloudWriter::new(make_store())
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn persist(
        &mut self,
        endpoint: &str,
        segment: &Segment,
        timeout: Option<Duration>,
    ) -> Result<(), StoreError> {
        let request = CreateRequest {
            size: segment.size(),
            start_ts: segment.start_ts(),
            duration: segment.duration(),
        };
        let object = self.store.create_object(endpoint, &request, timeout)?;
        self.store.upload(&object, segment.data(), timeout)?;
        self.store
            .commit(endpoint, &object, &SegmentInfo::from(segment), timeout)?;
        debug!(
            "Segment {} stored as {} ({})",
            segment.sequence(),
            object.name,
            object.uri
        );
        Ok(())
    }
}

impl<S: ObjectStore> SegmentWriter for CloudWriter<S> {
    fn init(&mut self, ctx: &WriterContext) -> Result<(), WriterError> {
        let endpoint = rest_endpoint(ctx.url()).ok_or_else(|| WriterError::Init {
            writer: NAME.to_string(),
            url: ctx.url().to_string(),
            reason: "url has no host part".to_string(),
        })?;
        self.endpoint = Some(endpoint);
        Ok(())
    }

    fn write_segment(
        &mut self,
        ctx: &WriterContext,
        segment: &Segment,
    ) -> Result<WriteOutcome, WriterError> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Err(write_failure(NAME, segment, "writer used before init"));
        };
        match self.persist(&endpoint, segment, ctx.writer_timeout()) {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(StoreError::Unavailable(reason)) => {
                warn!(
                    "Cloud store unavailable, segment {} skipped: {}",
                    segment.sequence(),
                    reason
                );
                Ok(WriteOutcome::Skipped)
            }
            Err(e) => Err(write_failure(NAME, segment, e)),
        }
    }

    fn uninit(&mut self, _ctx: &WriterContext) {
        self.endpoint = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        calls: Vec<String>,
        objects: Vec<(String, Vec<u8>)>,
        fail_on: Option<(&'static str, StoreError)>,
    }

    impl MemoryStore {
        fn check(&self, step: &str) -> Result<(), StoreError> {
            match &self.fail_on {
                Some((fail_step, err)) if *fail_step == step => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }

    impl ObjectStore for MemoryStore {
        fn create_object(
            &mut self,
            endpoint: &str,
            request: &CreateRequest,
            _timeout: Option<Duration>,
        ) -> Result<RemoteObject, StoreError> {
            self.calls.push(format!("create {} {}", endpoint, request.size));
            self.check("create")?;
            let name = format!("obj{}", self.objects.len());
            Ok(RemoteObject {
                uri: format!("http://blob/{}", name),
                name,
            })
        }

        fn upload(
            &mut self,
            object: &RemoteObject,
            data: &[u8],
            _timeout: Option<Duration>,
        ) -> Result<(), StoreError> {
            self.calls.push(format!("upload {}", object.uri));
            self.check("upload")?;
            self.objects.push((object.name.clone(), data.to_vec()));
            Ok(())
        }

        fn commit(
            &mut self,
            _endpoint: &str,
            object: &RemoteObject,
            segment: &SegmentInfo,
            _timeout: Option<Duration>,
        ) -> Result<(), StoreError> {
            self.calls
                .push(format!("commit {} seq={}", object.name, segment.sequence));
            self.check("commit")
        }
    }

    fn make_segment() -> Segment {
        let mut segment = Segment::with_capacity(16);
        segment.append(b"ts-bytes").unwrap();
        segment.set_start(0, 1_700_000_000.0);
        segment.set_duration(10.0);
        segment.stamp(5, 0);
        segment
    }

    fn ctx() -> WriterContext {
        WriterContext::new("ivr://10.0.0.1:8080/api/records", None, 10.0)
    }

    #[test]
    fn endpoint_derivation() {
        assert_eq!(
            rest_endpoint("ivr://10.0.0.1:8080/api").as_deref(),
            Some("http://10.0.0.1:8080/api")
        );
        assert_eq!(rest_endpoint("ivr:"), None);
        assert_eq!(rest_endpoint("no-scheme"), None);
    }

    #[test]
    fn three_steps_in_order() {
        let mut writer = CloudWriter::new(MemoryStore::default());
        writer.init(&ctx()).unwrap();
        let outcome = writer.write_segment(&ctx(), &make_segment()).unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(
            writer.store().calls,
            vec![
                "create http://10.0.0.1:8080/api/records 8".to_string(),
                "upload http://blob/obj0".to_string(),
                "commit obj0 seq=5".to_string(),
            ]
        );
        assert_eq!(writer.store().objects[0].1, b"ts-bytes");
    }

    #[test]
    fn unavailable_store_skips() {
        let store = MemoryStore {
            fail_on: Some(("upload", StoreError::Unavailable("503".into()))),
            ..Default::default()
        };
        let mut writer = CloudWriter::new(store);
        writer.init(&ctx()).unwrap();
        assert_eq!(
            writer.write_segment(&ctx(), &make_segment()).unwrap(),
            WriteOutcome::Skipped
        );
        assert_eq!(writer.store().calls.len(), 2);
    }

    #[test]
    fn failed_commit_is_fatal() {
        let store = MemoryStore {
            fail_on: Some(("commit", StoreError::Failed("500".into()))),
            ..Default::default()
        };
        let mut writer = CloudWriter::new(store);
        writer.init(&ctx()).unwrap();
        let err = writer.write_segment(&ctx(), &make_segment()).unwrap_err();
        assert_eq!(
            err,
            WriterError::Write {
                writer: NAME.to_string(),
                sequence: 5,
                reason: "store request failed: 500".to_string(),
            }
        );
    }

    #[test]
    fn entry_claims_ivr_scheme() {
        let mut registry = crate::writer::WriterRegistry::with_builtin();
        registry.register(CloudWriter::entry(MemoryStore::default));
        let entry = registry.find("ivr://10.0.0.1/api").unwrap();
        assert_eq!(entry.name(), "ivr_writer");

        let mut writer = entry.create();
        writer.init(&ctx()).unwrap();
        assert_eq!(
            writer.write_segment(&ctx(), &make_segment()).unwrap(),
            WriteOutcome::Written
        );
    }

    #[test]
    fn write_before_init_fails() {
        let mut writer = CloudWriter::new(MemoryStore::default());
        assert!(writer.write_segment(&ctx(), &make_segment()).is_err());
        assert!(writer.store().calls.is_empty());
    }
}
