//! services/client/src/adapters/rest.rs
//!
//! This module contains the table adapter, the concrete implementation of the
//! `DatabaseService` port from the `core` crate. It talks to the backend's REST
//! interface under `/rest/v1`, where joins are expressed as embedded resources
//! in the `select` parameter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use campus_swap_core::domain::{
    Listing, ListingWithOwner, Location, Message, NewListing, NewMessage, NewTrade,
    ObjectCategory, ObjectStatus, Profile, ProfileBadge, Trade, TradeNotification, TradeStatus,
    TradeWithParties,
};
use campus_swap_core::ports::{DatabaseService, PortError, PortResult};

use super::http::BackendHttp;

const LISTING_WITH_OWNER: &str = "*,owner:profiles(*)";
const TRADE_WITH_PARTIES: &str = "*,proponente:profiles!trades_proponente_id_fkey(*),receptor:profiles!trades_receptor_id_fkey(*)";
const TRADE_NOTIFICATION: &str = "*,proponente:profiles!trades_proponente_id_fkey(nome_completo,avatar_url),objeto_oferecido:objects!trades_objeto_oferecido_id_fkey(titulo),objeto_desejado:objects!trades_objeto_desejado_id_fkey(titulo)";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A table adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct RestAdapter {
    http: BackendHttp,
}

impl RestAdapter {
    pub fn new(http: BackendHttp) -> Self {
        Self { http }
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> PortResult<Vec<T>> {
        let request = self
            .http
            .request(Method::GET, &format!("/rest/v1/{}", table))
            .await
            .query(query);
        self.http.send_json(request).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        what: &str,
        query: &[(&str, String)],
    ) -> PortResult<T> {
        self.select(table, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortError::NotFound(what.to_string()))
    }

    /// Inserts one row and returns it as stored.
    async fn insert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> PortResult<T> {
        let request = self
            .http
            .request(Method::POST, &format!("/rest/v1/{}", table))
            .await
            .header("Prefer", "return=representation")
            .json(&[body]);
        let rows: Vec<T> = self.http.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| PortError::Unexpected(format!("insert into {} returned no row", table)))
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

fn parse_wire<T: FromStr>(value: &str) -> PortResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Wire Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct ProfileRecord {
    id: Uuid,
    email: String,
    nome_completo: String,
    matricula: Option<String>,
    curso: Option<String>,
    bio: Option<String>,
    telefone: Option<String>,
    avatar_url: Option<String>,
    vinculo_ativo: Option<bool>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            id: self.id,
            email: self.email,
            display_name: self.nome_completo,
            enrollment_number: self.matricula,
            program: self.curso,
            bio: self.bio,
            phone: self.telefone,
            avatar_url: self.avatar_url,
            active_affiliation: self.vinculo_ativo.unwrap_or(true),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct BadgeRecord {
    nome_completo: String,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct TitleRecord {
    titulo: String,
}

#[derive(Deserialize)]
struct ObjectRecord {
    id: Uuid,
    owner_id: Uuid,
    titulo: String,
    descricao: String,
    categoria: String,
    condicao: String,
    imagens: Option<Vec<String>>,
    status: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}
impl ObjectRecord {
    fn to_domain(self) -> PortResult<Listing> {
        Ok(Listing {
            id: self.id,
            owner_id: self.owner_id,
            title: self.titulo,
            description: self.descricao,
            category: parse_wire::<ObjectCategory>(&self.categoria)?,
            condition: self.condicao,
            images: self.imagens.unwrap_or_default(),
            status: match self.status {
                Some(status) => parse_wire::<ObjectStatus>(&status)?,
                None => ObjectStatus::default(),
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Deserialize)]
struct ObjectWithOwnerRecord {
    #[serde(flatten)]
    object: ObjectRecord,
    owner: ProfileRecord,
}
impl ObjectWithOwnerRecord {
    fn to_domain(self) -> PortResult<ListingWithOwner> {
        Ok(ListingWithOwner {
            listing: self.object.to_domain()?,
            owner: self.owner.to_domain(),
        })
    }
}

#[derive(Deserialize)]
struct TradeRecord {
    id: Uuid,
    proponente_id: Uuid,
    receptor_id: Uuid,
    objeto_oferecido_id: Uuid,
    objeto_desejado_id: Uuid,
    location_id: Option<Uuid>,
    status: Option<String>,
    mensagem: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}
impl TradeRecord {
    fn to_domain(self) -> PortResult<Trade> {
        Ok(Trade {
            id: self.id,
            proposer_id: self.proponente_id,
            recipient_id: self.receptor_id,
            offered_listing_id: self.objeto_oferecido_id,
            desired_listing_id: self.objeto_desejado_id,
            location_id: self.location_id,
            status: match self.status {
                Some(status) => parse_wire::<TradeStatus>(&status)?,
                None => TradeStatus::default(),
            },
            message: self.mensagem,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Deserialize)]
struct TradeWithPartiesRecord {
    #[serde(flatten)]
    trade: TradeRecord,
    proponente: ProfileRecord,
    receptor: ProfileRecord,
}
impl TradeWithPartiesRecord {
    fn to_domain(self) -> PortResult<TradeWithParties> {
        Ok(TradeWithParties {
            trade: self.trade.to_domain()?,
            proposer: self.proponente.to_domain(),
            recipient: self.receptor.to_domain(),
        })
    }
}

#[derive(Deserialize)]
struct TradeNotificationRecord {
    #[serde(flatten)]
    trade: TradeRecord,
    proponente: BadgeRecord,
    objeto_oferecido: TitleRecord,
    objeto_desejado: TitleRecord,
}
impl TradeNotificationRecord {
    fn to_domain(self) -> PortResult<TradeNotification> {
        Ok(TradeNotification {
            trade: self.trade.to_domain()?,
            proposer: ProfileBadge {
                display_name: self.proponente.nome_completo,
                avatar_url: self.proponente.avatar_url,
            },
            offered_title: self.objeto_oferecido.titulo,
            desired_title: self.objeto_desejado.titulo,
        })
    }
}

/// Also the shape of the `record` in a realtime insert on `messages`.
#[derive(Deserialize)]
pub(crate) struct MessageRecord {
    id: Uuid,
    trade_id: Uuid,
    sender_id: Uuid,
    content: String,
    read: Option<bool>,
    created_at: Option<DateTime<Utc>>,
}
impl MessageRecord {
    pub(crate) fn to_domain(self) -> Message {
        Message {
            id: self.id,
            trade_id: self.trade_id,
            sender_id: self.sender_id,
            content: self.content,
            read: self.read.unwrap_or(false),
            created_at: self.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

#[derive(Deserialize)]
struct LocationRecord {
    id: Uuid,
    nome: String,
    endereco: String,
    descricao: Option<String>,
    created_at: Option<DateTime<Utc>>,
}
impl LocationRecord {
    fn to_domain(self) -> Location {
        Location {
            id: self.id,
            name: self.nome,
            address: self.endereco,
            description: self.descricao,
            created_at: self.created_at,
        }
    }
}

#[derive(Serialize)]
struct ObjectInsert<'a> {
    owner_id: Uuid,
    titulo: &'a str,
    descricao: &'a str,
    categoria: &'static str,
    condicao: &'a str,
    imagens: &'a [String],
    status: &'static str,
}

#[derive(Serialize)]
struct TradeInsert<'a> {
    proponente_id: Uuid,
    receptor_id: Uuid,
    objeto_oferecido_id: Uuid,
    objeto_desejado_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_id: Option<Uuid>,
    status: &'static str,
    mensagem: Option<&'a str>,
}

#[derive(Serialize)]
struct MessageInsert<'a> {
    trade_id: Uuid,
    sender_id: Uuid,
    content: &'a str,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for RestAdapter {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        let record: ProfileRecord = self
            .select_one(
                "profiles",
                &format!("Profile {} not found", user_id),
                &[("select", "*".to_string()), ("id", eq(user_id))],
            )
            .await?;
        Ok(record.to_domain())
    }

    async fn list_available_listings(&self) -> PortResult<Vec<ListingWithOwner>> {
        let records: Vec<ObjectWithOwnerRecord> = self
            .select(
                "objects",
                &[
                    ("select", LISTING_WITH_OWNER.to_string()),
                    ("status", eq(ObjectStatus::Available.as_str())),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        records.into_iter().map(ObjectWithOwnerRecord::to_domain).collect()
    }

    async fn get_listing_with_owner(&self, listing_id: Uuid) -> PortResult<ListingWithOwner> {
        let record: ObjectWithOwnerRecord = self
            .select_one(
                "objects",
                &format!("Listing {} not found", listing_id),
                &[
                    ("select", LISTING_WITH_OWNER.to_string()),
                    ("id", eq(listing_id)),
                ],
            )
            .await?;
        record.to_domain()
    }

    async fn list_listings_by_owner(
        &self,
        owner_id: Uuid,
        status: Option<ObjectStatus>,
    ) -> PortResult<Vec<Listing>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("owner_id", eq(owner_id)),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", eq(status.as_str())));
        }
        let records: Vec<ObjectRecord> = self.select("objects", &query).await?;
        records.into_iter().map(ObjectRecord::to_domain).collect()
    }

    async fn insert_listing(&self, listing: NewListing) -> PortResult<Listing> {
        let body = ObjectInsert {
            owner_id: listing.owner_id,
            titulo: &listing.title,
            descricao: &listing.description,
            categoria: listing.category.as_str(),
            condicao: &listing.condition,
            imagens: &listing.images,
            status: listing.status.as_str(),
        };
        let record: ObjectRecord = self.insert("objects", &body).await?;
        record.to_domain()
    }

    async fn insert_trade(&self, trade: NewTrade) -> PortResult<Trade> {
        let body = TradeInsert {
            proponente_id: trade.proposer_id,
            receptor_id: trade.recipient_id,
            objeto_oferecido_id: trade.offered_listing_id,
            objeto_desejado_id: trade.desired_listing_id,
            location_id: trade.location_id,
            status: trade.status.as_str(),
            mensagem: trade.message.as_deref(),
        };
        let record: TradeRecord = self.insert("trades", &body).await?;
        record.to_domain()
    }

    async fn list_trade_notifications(
        &self,
        recipient_id: Uuid,
        statuses: &[TradeStatus],
        limit: usize,
    ) -> PortResult<Vec<TradeNotification>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let records: Vec<TradeNotificationRecord> = self
            .select(
                "trades",
                &[
                    ("select", TRADE_NOTIFICATION.to_string()),
                    ("receptor_id", eq(recipient_id)),
                    ("status", format!("in.({})", statuses.join(","))),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        records.into_iter().map(TradeNotificationRecord::to_domain).collect()
    }

    async fn list_trades_for_participant(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<TradeWithParties>> {
        let records: Vec<TradeWithPartiesRecord> = self
            .select(
                "trades",
                &[
                    ("select", TRADE_WITH_PARTIES.to_string()),
                    (
                        "or",
                        format!("(proponente_id.eq.{0},receptor_id.eq.{0})", user_id),
                    ),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        records.into_iter().map(TradeWithPartiesRecord::to_domain).collect()
    }

    async fn list_messages(&self, trade_id: Uuid) -> PortResult<Vec<Message>> {
        let records: Vec<MessageRecord> = self
            .select(
                "messages",
                &[
                    ("select", "*".to_string()),
                    ("trade_id", eq(trade_id)),
                    ("order", "created_at.asc".to_string()),
                ],
            )
            .await?;
        Ok(records.into_iter().map(MessageRecord::to_domain).collect())
    }

    async fn insert_message(&self, message: NewMessage) -> PortResult<Message> {
        let body = MessageInsert {
            trade_id: message.trade_id,
            sender_id: message.sender_id,
            content: &message.content,
        };
        let record: MessageRecord = self.insert("messages", &body).await?;
        Ok(record.to_domain())
    }

    async fn list_locations(&self) -> PortResult<Vec<Location>> {
        let records: Vec<LocationRecord> = self
            .select(
                "locations",
                &[("select", "*".to_string()), ("order", "nome.asc".to_string())],
            )
            .await?;
        Ok(records.into_iter().map(LocationRecord::to_domain).collect())
    }
}
