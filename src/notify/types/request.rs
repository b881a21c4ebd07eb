use serde::Serialize;

/// Outbound subscription request.
///
/// Subscribe requests are remembered by the client and sent again after every reconnect;
/// the matching unsubscribe request forgets them.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionRequest {
    /// Start receiving progress for a job
    SubscribeJob {
        /// Job identifier
        job_id: String,
    },
    /// Stop receiving progress for a job
    UnsubscribeJob {
        /// Job identifier
        job_id: String,
    },
    /// Start receiving status and sync events for a repository
    SubscribeRepo {
        /// Repository identifier
        repo_id: String,
    },
    /// Stop receiving status and sync events for a repository
    UnsubscribeRepo {
        /// Repository identifier
        repo_id: String,
    },
}

impl SubscriptionRequest {
    #[must_use]
    pub fn subscribe_job<S: Into<String>>(job_id: S) -> Self {
        Self::SubscribeJob {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn unsubscribe_job<S: Into<String>>(job_id: S) -> Self {
        Self::UnsubscribeJob {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn subscribe_repo<S: Into<String>>(repo_id: S) -> Self {
        Self::SubscribeRepo {
            repo_id: repo_id.into(),
        }
    }

    #[must_use]
    pub fn unsubscribe_repo<S: Into<String>>(repo_id: S) -> Self {
        Self::UnsubscribeRepo {
            repo_id: repo_id.into(),
        }
    }

    /// Key under which the subscription intent is remembered for replay.
    ///
    /// A subscribe request and its matching unsubscribe request share the same key.
    #[must_use]
    pub fn intent_key(&self) -> String {
        match self {
            Self::SubscribeJob { job_id } | Self::UnsubscribeJob { job_id } => {
                format!("job:{job_id}")
            }
            Self::SubscribeRepo { repo_id } | Self::UnsubscribeRepo { repo_id } => {
                format!("repo:{repo_id}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn subscription_requests_serialize_with_type_tag() {
        assert_eq!(
            serde_json::to_value(SubscriptionRequest::subscribe_job("j-1")).unwrap(),
            json!({ "type": "subscribe_job", "job_id": "j-1" })
        );
        assert_eq!(
            serde_json::to_value(SubscriptionRequest::unsubscribe_repo("r-2")).unwrap(),
            json!({ "type": "unsubscribe_repo", "repo_id": "r-2" })
        );
    }

    #[test]
    fn subscribe_and_unsubscribe_share_intent_key() {
        assert_eq!(
            SubscriptionRequest::subscribe_job("a").intent_key(),
            SubscriptionRequest::unsubscribe_job("a").intent_key()
        );
        assert_ne!(
            SubscriptionRequest::subscribe_job("a").intent_key(),
            SubscriptionRequest::subscribe_repo("a").intent_key()
        );
    }
}
