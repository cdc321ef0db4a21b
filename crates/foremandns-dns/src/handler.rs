//! Per-query handling
//!
//! hickory-server hands every decoded request to [`QueryHandler`], which
//! classifies it, resolves A questions and writes the reply. Anything that is
//! not an A question gets a NOERROR reply with no answers rather than NOTIMP.

use crate::resolver::{Resolution, Resolver};
use async_trait::async_trait;
use hickory_proto::op::{Header, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// TTL on every answer we send, independent of the cache TTL
pub const ANSWER_TTL: u32 = 60;

/// How a failed inventory lookup shows up to DNS clients.
///
/// `Empty` keeps clients from telling "no such host" apart from "inventory
/// down"; `ServFail` makes outages visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// NOERROR with zero answers
    #[default]
    Empty,
    /// SERVFAIL
    ServFail,
}

impl FailurePolicy {
    /// Parse a configured policy. Unknown values fall back to `Empty`.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "servfail" | "serv-fail" => Self::ServFail,
            _ => Self::Empty,
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::ServFail => f.write_str("servfail"),
        }
    }
}

/// Reduce a question name to its cache/inventory key.
///
/// Drops the trailing root dot, then the zone suffix, then the separator in
/// front of it: `host1.zone.example.com.` in zone `zone.example.com` becomes
/// `host1`. The zone only matches on a label boundary, and the result is
/// lowercased. A name outside the zone is returned whole.
///
/// This is stricter than plain suffix trimming on purpose: with zone
/// `infra.local`, `badinfra.local.` stays `badinfra.local` instead of
/// becoming `bad`.
pub fn normalize(name: &str, zone: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name).to_lowercase();
    let zone = zone.trim().trim_matches('.').to_lowercase();
    if zone.is_empty() {
        return name;
    }

    let stripped = match name.strip_suffix(zone.as_str()) {
        Some(prefix) if prefix.is_empty() || prefix.ends_with('.') => {
            Some(prefix.strip_suffix('.').unwrap_or(prefix).to_string())
        }
        _ => None,
    };
    stripped.unwrap_or(name)
}

/// What goes into the reply for one request
#[derive(Debug, Clone)]
pub struct Reply {
    pub response_code: ResponseCode,
    pub authoritative: bool,
    pub answers: Vec<Record>,
}

impl Reply {
    fn empty(response_code: ResponseCode) -> Self {
        Self {
            response_code,
            authoritative: false,
            answers: Vec::new(),
        }
    }
}

/// Turns DNS queries into DNS replies
pub struct QueryHandler {
    resolver: Arc<Resolver>,
    zone: String,
    failure_policy: FailurePolicy,
}

impl QueryHandler {
    pub fn new(resolver: Arc<Resolver>, zone: impl Into<String>) -> Self {
        Self {
            resolver,
            zone: zone.into(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Work out the reply to a request's first question.
    ///
    /// The answer carries the question name exactly as the client sent it.
    pub async fn answer(&self, op_code: OpCode, query: Option<&Query>) -> Reply {
        if op_code != OpCode::Query {
            return Reply::empty(ResponseCode::NotImp);
        }

        let Some(query) = query else {
            return Reply::empty(ResponseCode::FormErr);
        };

        if query.query_type() != RecordType::A {
            debug!(name = %query.name(), qtype = %query.query_type(), "Not an A query, empty answer");
            return Reply::empty(ResponseCode::NoError);
        }

        let mut reply = Reply {
            authoritative: true,
            ..Reply::empty(ResponseCode::NoError)
        };

        let question = query.name().clone();
        let domain = normalize(&question.to_string(), &self.zone);
        debug!(name = %question, domain = %domain, "A query");
        if domain.is_empty() {
            return reply;
        }

        match self.resolver.lookup(&domain).await {
            Resolution::Cached(ip) | Resolution::Resolved(ip) => {
                reply
                    .answers
                    .push(Record::from_rdata(question, ANSWER_TTL, RData::A(A(ip))));
            }
            Resolution::NotFound => {}
            Resolution::Failed(_) => {
                if self.failure_policy == FailurePolicy::ServFail {
                    reply.response_code = ResponseCode::ServFail;
                }
            }
        }

        reply
    }
}

#[async_trait]
impl RequestHandler for QueryHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let query = request.queries().first().map(|q| q.original());
        let reply = self.answer(request.op_code(), query).await;

        let mut header = Header::response_from_request(request.header());
        header.set_response_code(reply.response_code);
        header.set_authoritative(reply.authoritative);

        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            reply.answers.iter(),
            &[],
            &[],
            &[],
        );

        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                warn!(client = %request.src(), error = %e, "Failed to send DNS response");
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
