use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::charts::RenderedChart;
use super::dispatcher::StatisticalDispatcher;
use super::llm::LlmGateway;
use crate::entities::chat_message::{self, Entity as ChatMessage};
use crate::errors::ServiceError;

/// Owner of a conversation: a signed-in user or an anonymous session key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatOwner {
    User(Uuid),
    Session(String),
}

impl ChatOwner {
    fn condition(&self) -> Condition {
        match self {
            ChatOwner::User(id) => Condition::all().add(chat_message::Column::UserId.eq(*id)),
            ChatOwner::Session(key) => Condition::all()
                .add(chat_message::Column::SessionKey.eq(key.as_str()))
                .add(chat_message::Column::UserId.is_null()),
        }
    }

    /// `(user_id, session_key)` columns of a new row; exactly one is set.
    fn columns(&self) -> (Option<Uuid>, Option<String>) {
        match self {
            ChatOwner::User(id) => (Some(*id), None),
            ChatOwner::Session(key) => (None, Some(key.clone())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ChatOwner::User(_) => "user",
            ChatOwner::Session(_) => "session",
        }
    }
}

/// Result of one chat turn, already persisted
#[derive(Clone, Debug)]
pub struct ChatOutcome {
    pub user_message: String,
    pub bot_response: String,
    pub created_at: DateTime<Utc>,
    pub chart: Option<RenderedChart>,
}

/// Chat orchestration: statistics first, then the language model
#[derive(Clone)]
pub struct ChatService {
    db: Arc<DatabaseConnection>,
    dispatcher: StatisticalDispatcher,
    gateway: LlmGateway,
    history_limit: u64,
    history_page_size: u64,
}

impl ChatService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        dispatcher: StatisticalDispatcher,
        gateway: LlmGateway,
        history_limit: u64,
        history_page_size: u64,
    ) -> Self {
        Self {
            db,
            dispatcher,
            gateway,
            history_limit,
            history_page_size,
        }
    }

    /// Most recent `limit` exchanges of `owner`, oldest first.
    async fn latest(
        &self,
        owner: &ChatOwner,
        limit: u64,
    ) -> Result<Vec<chat_message::Model>, ServiceError> {
        let mut rows = ChatMessage::find()
            .filter(owner.condition())
            .order_by_desc(chat_message::Column::CreatedAt)
            .order_by_desc(chat_message::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Context window handed to the language model.
    pub async fn recent_history(
        &self,
        owner: &ChatOwner,
    ) -> Result<Vec<chat_message::Model>, ServiceError> {
        self.latest(owner, self.history_limit).await
    }

    /// Exchanges shown on the chat page.
    pub async fn history_page(
        &self,
        owner: &ChatOwner,
    ) -> Result<Vec<chat_message::Model>, ServiceError> {
        self.latest(owner, self.history_page_size).await
    }

    async fn answer(
        &self,
        owner: &ChatOwner,
        message: &str,
    ) -> Result<(String, Option<RenderedChart>), ServiceError> {
        match self.dispatcher.respond(message).await {
            Ok(Some(reply)) => return Ok((reply.text, reply.chart)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "statistical report failed, asking the language model"),
        }

        let history = self.recent_history(owner).await?;
        Ok((self.gateway.respond(message, &history).await, None))
    }

    /// Answers `message` and appends the exchange to the owner's history.
    #[instrument(skip(self, message), fields(owner = owner.kind()))]
    pub async fn handle_message(
        &self,
        owner: &ChatOwner,
        message: &str,
    ) -> Result<ChatOutcome, ServiceError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::ValidationError(
                "El mensaje no puede estar vacío".to_string(),
            ));
        }

        let (bot_response, chart) = self.answer(owner, message).await?;
        let (user_id, session_key) = owner.columns();

        let saved = chat_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_key: Set(session_key),
            user_message: Set(message.to_string()),
            bot_response: Set(bot_response),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        counter!("assistant.chat_messages", 1, "owner" => owner.kind());
        info!(message_id = %saved.id, chart = chart.is_some(), "chat exchange stored");

        Ok(ChatOutcome {
            user_message: saved.user_message,
            bot_response: saved.bot_response,
            created_at: saved.created_at,
            chart,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OrderStatus;
    use crate::services::analytics::AnalyticsService;
    use crate::services::catalog::CatalogService;
    use crate::services::charts::ChartService;
    use crate::services::fallback::FallbackResponder;
    use crate::services::llm::{GenerationParams, LanguageModel, MockLanguageModel};
    use crate::services::test_fixtures::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn service(db: Arc<DatabaseConnection>, model: Option<Arc<dyn LanguageModel>>) -> ChatService {
        let catalog = CatalogService::new(db.clone());
        let analytics = AnalyticsService::new(db.clone(), 10);
        let dispatcher =
            StatisticalDispatcher::new(analytics.clone(), ChartService::new(analytics.clone(), 30), 10);
        let fallback = FallbackResponder::new(catalog.clone(), analytics, 200_000);
        let gateway = LlmGateway::new(
            model,
            catalog,
            fallback,
            GenerationParams {
                max_output_tokens: 1000,
                temperature: 0.7,
            },
        );
        ChatService::new(db, dispatcher, gateway, 10, 20)
    }

    #[tokio::test]
    async fn anonymous_messages_share_the_session_key() {
        let db = memory_db().await;
        let chat = service(db.clone(), None);
        let owner = ChatOwner::Session("sess-1".into());

        chat.handle_message(&owner, "hola").await.unwrap();
        chat.handle_message(&owner, "quiero comprar").await.unwrap();

        let rows = ChatMessage::find().all(&*db).await.unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.session_key.as_deref(), Some("sess-1"));
            assert!(row.user_id.is_none());
        }
    }

    #[tokio::test]
    async fn authenticated_messages_carry_only_the_user() {
        let db = memory_db().await;
        let user = seed_user(&db, "ana@example.com").await;
        let chat = service(db.clone(), None);

        chat.handle_message(&ChatOwner::User(user.id), "hola")
            .await
            .unwrap();

        let row = ChatMessage::find().one(&*db).await.unwrap().unwrap();
        assert_eq!(row.user_id, Some(user.id));
        assert!(row.session_key.is_none());
    }

    #[tokio::test]
    async fn blank_messages_are_rejected_without_storing() {
        let db = memory_db().await;
        let chat = service(db.clone(), None);

        let err = chat
            .handle_message(&ChatOwner::Session("s".into()), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        assert!(ChatMessage::find().all(&*db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_chronological_and_scoped_to_owner() {
        let db = memory_db().await;
        let chat = service(db.clone(), None);
        let mine = ChatOwner::Session("mine".into());
        let other = ChatOwner::Session("other".into());

        for text in ["uno", "dos", "tres"] {
            chat.handle_message(&mine, text).await.unwrap();
        }
        chat.handle_message(&other, "ajeno").await.unwrap();

        let history = chat.history_page(&mine).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.user_message.as_str()).collect();
        assert_eq!(texts, vec!["uno", "dos", "tres"]);
    }

    #[tokio::test]
    async fn statistics_short_circuit_the_language_model() {
        let db = memory_db().await;
        for total in [dec!(50), dec!(40), dec!(60)] {
            seed_order(
                &db,
                OrderStatus::Completed,
                total,
                Utc::now() - Duration::hours(2),
                None,
            )
            .await;
        }
        let mut model = MockLanguageModel::new();
        model.expect_generate().never();

        let chat = service(db, Some(Arc::new(model)));
        let outcome = chat
            .handle_message(
                &ChatOwner::Session("s".into()),
                "muéstrame ventas de los últimos 7 días",
            )
            .await
            .unwrap();

        assert!(outcome.bot_response.contains("$150.00"));
        assert!(outcome.chart.is_none());
    }

    #[tokio::test]
    async fn prior_exchanges_reach_the_prompt() {
        let db = memory_db().await;
        let mut model = MockLanguageModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("Tenemos camperas.".to_string()));
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|prompt, _| prompt.contains("- Asistente: Tenemos camperas."))
            .returning(|_, _| Ok("Cuestan $180,000.".to_string()));

        let chat = service(db, Some(Arc::new(model)));
        let owner = ChatOwner::Session("s".into());
        chat.handle_message(&owner, "¿hay camperas?").await.unwrap();
        let outcome = chat.handle_message(&owner, "¿cuánto cuestan?").await.unwrap();
        assert_eq!(outcome.bot_response, "Cuestan $180,000.");
    }
}
