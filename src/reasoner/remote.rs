use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    context::{
        CreatorContext,
        adapters::http::{CORRELATION_HEADER, REQUEST_ID_HEADER},
    },
    reasoner::{
        error::{ReasonerError, ReasonerErrorKind, contract_violation},
        ports::{Reasoner, ReasonerInput},
        types::{ReasonerName, ReasonerOutput},
    },
    reliability::CircuitBreakers,
    types::Request,
};

#[derive(Serialize)]
struct EvaluateBody<'a> {
    request: &'a Request,
    context: &'a CreatorContext,
    deadline_ms: u64,
    confidence_floor: f64,
}

/// A reasoner hosted by an external advisory service speaking JSON over HTTP.
pub struct HttpReasoner {
    name: ReasonerName,
    client: Client,
    endpoint: String,
    breakers: CircuitBreakers,
}

impl HttpReasoner {
    pub fn new(
        name: ReasonerName,
        client: Client,
        endpoint: impl Into<String>,
        breakers: CircuitBreakers,
    ) -> Self {
        Self {
            name,
            client,
            endpoint: endpoint.into(),
            breakers,
        }
    }

    fn dependency(&self) -> String {
        format!("reasoner:{}", self.name)
    }

    async fn call(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let remaining = input.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ReasonerError::new(
                ReasonerErrorKind::Timeout,
                self.name,
                "deadline already passed before dispatch",
            ));
        }

        let body = EvaluateBody {
            request: &input.request,
            context: &input.context,
            deadline_ms: remaining.as_millis() as u64,
            confidence_floor: input.confidence_floor,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(remaining)
            .header(CORRELATION_HEADER, &input.request.correlation_id)
            .header(REQUEST_ID_HEADER, &input.request.request_id)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                let kind = if err.is_timeout() {
                    ReasonerErrorKind::Timeout
                } else {
                    ReasonerErrorKind::Transport
                };
                ReasonerError::new(
                    kind,
                    self.name,
                    format!("remote reasoner request failed: {err}"),
                )
            })?;

        if !response.status().is_success() {
            return Err(ReasonerError::new(
                ReasonerErrorKind::Transport,
                self.name,
                format!("remote reasoner returned status {}", response.status().as_u16()),
            ));
        }

        let output: ReasonerOutput = response.json().await.map_err(|err| {
            contract_violation(self.name, format!("remote reasoner body is invalid: {err}"))
        })?;
        if output.reasoner_name != self.name {
            return Err(contract_violation(
                self.name,
                format!("remote reasoner answered as '{}'", output.reasoner_name),
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    fn name(&self) -> ReasonerName {
        self.name
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        let dependency = self.dependency();
        let permit = self.breakers.ensure_allowed(&dependency).map_err(|open| {
            ReasonerError::new(ReasonerErrorKind::CircuitOpen, self.name, open.to_string())
        })?;

        let result = self.call(input).await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(err) => permit.fail(err.counts_toward_breaker()),
        }
        result
    }
}
