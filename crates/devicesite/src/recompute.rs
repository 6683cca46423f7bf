//! Dependency-driven recompute protocol.
//!
//! One trigger = one request: the changed field plus the current text of its
//! declared dependents goes out, and every key of the answer that names a
//! field in the document is written back verbatim.
//!
//! Triggers are independent. Nothing is queued or cancelled, so when two
//! requests race their responses land in arrival order and the last write
//! to a field wins.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::config::FormConfig;
use crate::credential::Credential;
use crate::dependency::DependencyGraph;
use crate::field_store::FieldStore;
use crate::transport::Transport;

/// Failure of a single recompute cycle. Never retried, only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeError {
    /// The request could not be completed.
    Network(String),
    /// The service answered with a non-2xx status.
    Status { code: u16, body: String },
    /// The body is not a JSON object of scalar values.
    MalformedResponse(String),
    InvalidEndpoint(String),
}

impl fmt::Display for RecomputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecomputeError::Network(reason) => write!(f, "network failure: {reason}"),
            RecomputeError::Status { code, .. } => write!(f, "service answered with status {code}"),
            RecomputeError::MalformedResponse(reason) => write!(f, "malformed response: {reason}"),
            RecomputeError::InvalidEndpoint(reason) => write!(f, "invalid endpoint: {reason}"),
        }
    }
}

impl std::error::Error for RecomputeError {}

/// Field name -> current text, triggering field first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeRequest {
    source: String,
    fields: Vec<(String, String)>,
}

impl RecomputeRequest {
    /// Snapshot `source` and its dependents. Absent names are skipped.
    pub fn build<S: FieldStore>(source: &str, graph: &DependencyGraph, store: &S) -> Self {
        let fields = std::iter::once(source)
            .chain(graph.dependents_of(source).iter().map(String::as_str))
            .filter_map(|name| Some((name.to_string(), store.read(name)?)))
            .collect();
        Self {
            source: source.to_string(),
            fields,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Field name -> new text, in the order the service sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeResponse {
    values: IndexMap<String, String>,
}

impl RecomputeResponse {
    /// Accepts a JSON object whose values are strings, numbers or booleans.
    /// Numbers keep the exact text of the body (`4.2e-09` stays `4.2e-09`,
    /// `0.0` stays `0.0`); nothing is reformatted on the way to the field.
    pub fn parse(body: &str) -> Result<Self, RecomputeError> {
        let object: IndexMap<String, JsonValue> = serde_json::from_str(body)
            .map_err(|e| RecomputeError::MalformedResponse(e.to_string()))?;

        let values = object
            .into_iter()
            .map(|(name, value)| {
                let text = match value {
                    JsonValue::String(text) => text,
                    JsonValue::Number(number) => number.to_string(),
                    JsonValue::Bool(flag) => flag.to_string(),
                    other => {
                        return Err(RecomputeError::MalformedResponse(format!(
                            "field `{name}` has non-scalar value {other}"
                        )));
                    }
                };
                Ok((name, text))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write every resolvable key into `store`, in response order.
    pub fn apply<S: FieldStore>(&self, store: &S) -> AppliedUpdate {
        let mut update = AppliedUpdate::default();
        for (name, value) in &self.values {
            if store.contains(name) {
                store.write(name, value);
                update.applied.push(name.clone());
            } else {
                update.skipped.push(name.clone());
            }
        }
        update
    }
}

/// Outcome of applying one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedUpdate {
    /// Fields written, in response order.
    pub applied: Vec<String>,
    /// Response keys with no matching field.
    pub skipped: Vec<String>,
}

pub struct RecomputeClient<S, T> {
    store: S,
    graph: DependencyGraph,
    transport: T,
    credential: Credential,
    endpoint: String,
    constants_path: String,
    device_param: String,
}

impl<S: FieldStore, T: Transport> RecomputeClient<S, T> {
    pub fn new(
        store: S,
        graph: DependencyGraph,
        transport: T,
        credential: Credential,
        endpoint: impl Into<String>,
    ) -> Self {
        let defaults = FormConfig::default();
        Self {
            store,
            graph,
            transport,
            credential,
            endpoint: endpoint.into(),
            constants_path: defaults.constants_path,
            device_param: defaults.device_param,
        }
    }

    pub fn from_config(store: S, transport: T, credential: Credential, config: &FormConfig) -> Self {
        Self {
            store,
            graph: config.dependencies.clone(),
            transport,
            credential,
            endpoint: config.endpoint.clone(),
            constants_path: config.constants_path.clone(),
            device_param: config.device_param.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Snapshot `source` and its dependents as they read right now.
    pub fn request(&self, source: &str) -> RecomputeRequest {
        RecomputeRequest::build(source, &self.graph, &self.store)
    }

    /// Run one recompute cycle for `source`.
    pub async fn trigger(&self, source: &str) -> Result<AppliedUpdate, RecomputeError> {
        self.send(self.request(source)).await
    }

    /// Send a prepared request and apply the answer.
    ///
    /// The response is applied right after the await without further
    /// suspension, so two cycles never interleave inside one field write.
    /// A failed cycle leaves the document untouched.
    pub async fn send(&self, request: RecomputeRequest) -> Result<AppliedUpdate, RecomputeError> {
        let source = request.source();
        log::debug!("recompute {source}: sending {:?}", request.fields());

        let body = self
            .transport
            .post_form(&self.endpoint, &self.credential, request.fields())
            .await?;
        let response = RecomputeResponse::parse(&body)?;
        log::debug!("response for {source}: {:?}", response.values);

        let update = response.apply(&self.store);
        if !update.skipped.is_empty() {
            log::debug!("response for {source}: no field for {:?}", update.skipped);
        }
        Ok(update)
    }

    /// Constants of `device`, shaped like a recompute response.
    pub async fn fetch_constants(&self, device: &str) -> Result<RecomputeResponse, RecomputeError> {
        let query = [(self.device_param.clone(), device.to_string())];
        let body = self.transport.get(&self.constants_path, &query).await?;
        RecomputeResponse::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_store::MemoryFieldStore;
    use crate::testing::RecordingTransport;
    use std::rc::Rc;

    fn form() -> MemoryFieldStore {
        MemoryFieldStore::new()
            .with_editable("ni", "1e10")
            .with_display("Vbi", "712.3")
            .with_editable("Vapp", "0.00")
            .with_editable("Wn", "")
            .with_display("Wp", "")
    }

    fn client(
        store: MemoryFieldStore,
        transport: &Rc<RecordingTransport>,
    ) -> RecomputeClient<MemoryFieldStore, Rc<RecordingTransport>> {
        RecomputeClient::new(
            store,
            DependencyGraph::diode_form(),
            Rc::clone(transport),
            Credential::new("X-CSRFToken", "tok"),
            "/diode/calculate/",
        )
    }

    #[test]
    fn request_skips_absent_dependents() {
        let store = MemoryFieldStore::new().with_editable("Is", "1e-12");
        let request = RecomputeRequest::build("Is", &DependencyGraph::diode_form(), &store);

        assert_eq!(request.source(), "Is");
        assert_eq!(request.fields(), [("Is".to_string(), "1e-12".to_string())]);
        assert_eq!(request.get("Id"), None);
    }

    #[test]
    fn request_keeps_declared_order() {
        let graph = DependencyGraph::new().with("Vapp", ["Wp", "Vbi", "Wn"]);
        let request = RecomputeRequest::build("Vapp", &graph, &form());

        let names: Vec<_> = request.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Vapp", "Wp", "Vbi", "Wn"]);
    }

    #[test]
    fn response_values_are_verbatim() {
        let response =
            RecomputeResponse::parse(r#"{"Id": 1e-14, "Vbi": "0.70", "Wn": 12, "ok": true}"#).unwrap();

        assert_eq!(response.get("Id"), Some("1e-14"));
        assert_eq!(response.get("Vbi"), Some("0.70"));
        assert_eq!(response.get("Wn"), Some("12"));
        assert_eq!(response.get("ok"), Some("true"));
        let order: Vec<_> = response.iter().map(|(k, _)| k).collect();
        assert_eq!(order, ["Id", "Vbi", "Wn", "ok"]);
    }

    #[test]
    fn numbers_keep_response_text() {
        let response =
            RecomputeResponse::parse(r#"{"Id": 4.2e-09, "Nd": 1e+17, "ni": 10000000000.0, "Wn": 0.0, "Vbi": -0.70}"#)
                .unwrap();

        assert_eq!(response.get("Id"), Some("4.2e-09"));
        assert_eq!(response.get("Nd"), Some("1e+17"));
        assert_eq!(response.get("ni"), Some("10000000000.0"));
        assert_eq!(response.get("Wn"), Some("0.0"));
        assert_eq!(response.get("Vbi"), Some("-0.70"));
    }

    #[test]
    fn malformed_responses() {
        for body in ["", "[1, 2]", "\"Vbi\"", r#"{"Vbi": null}"#, r#"{"Vbi": {"v": 1}}"#, "{oops"] {
            assert!(
                matches!(RecomputeResponse::parse(body), Err(RecomputeError::MalformedResponse(_))),
                "accepted {body:?}"
            );
        }
    }

    #[test]
    fn apply_skips_unknown_keys() {
        let store = form();
        let response = RecomputeResponse::parse(r#"{"error": "Invalid request", "Wp": "3.1e2"}"#).unwrap();

        let update = response.apply(&store);

        assert_eq!(update.applied, ["Wp"]);
        assert_eq!(update.skipped, ["error"]);
        assert_eq!(store.read("Wp").as_deref(), Some("3.1e2"));
    }

    #[tokio::test]
    async fn trigger_sends_source_and_dependents() {
        let transport = Rc::new(RecordingTransport::new());
        transport.reply(r#"{"Wn": "1.234e+02"}"#);
        let client = client(form(), &transport);

        let update = client.trigger("Vapp").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/diode/calculate/");
        assert_eq!(requests[0].header, Some(("X-CSRFToken".to_string(), "tok".to_string())));
        assert_eq!(
            requests[0].fields,
            [
                ("Vapp".to_string(), "0.00".to_string()),
                ("Wn".to_string(), String::new()),
            ]
        );
        assert_eq!(update.applied, ["Wn"]);
        assert_eq!(client.store().read("Wn").as_deref(), Some("1.234e+02"));
    }

    #[tokio::test]
    async fn failed_cycle_leaves_fields_untouched() {
        let transport = Rc::new(RecordingTransport::new());
        transport.fail(RecomputeError::Network("connection refused".to_string()));
        transport.reply("<html>oops</html>");
        transport.reply_with_status(400, r#"{"error": "Invalid request"}"#);
        let client = client(form(), &transport);
        let before = client.store().snapshot();

        assert!(matches!(client.trigger("ni").await, Err(RecomputeError::Network(_))));
        assert!(matches!(
            client.trigger("ni").await,
            Err(RecomputeError::MalformedResponse(_))
        ));
        assert!(matches!(
            client.trigger("ni").await,
            Err(RecomputeError::Status { code: 400, .. })
        ));

        assert_eq!(client.store().snapshot(), before);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn constants_use_device_query() {
        let transport = Rc::new(RecordingTransport::new());
        transport.reply(r#"{"Is": 1e-12, "n": 1.0, "ni": 10000000000.0}"#);
        let client = client(form(), &transport);

        let constants = client.fetch_constants("1N4148").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/diode/diode/constants");
        assert_eq!(requests[0].fields, [("diode".to_string(), "1N4148".to_string())]);
        assert_eq!(constants.get("Is"), Some("1e-12"));
        assert_eq!(constants.len(), 3);
    }
}
