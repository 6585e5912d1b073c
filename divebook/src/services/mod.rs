//! One module per booking API resource. Each maps a domain operation onto a
//! single [`ApiClient`] call; none of them keeps state of its own.

pub mod admins;
pub mod blog;
pub mod bookings;
pub mod coupons;
pub mod courses;
pub mod currency;
pub mod gallery;
pub mod notifications;
pub mod packages;
pub mod payments;
pub mod testimonials;
pub mod trips;
pub mod users;

use std::marker::PhantomData;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::api::{ApiClient, Auth, ClientError};

use self::admins::Admins;
use self::bookings::Bookings;
use self::coupons::Coupons;
use self::gallery::Gallery;
use self::notifications::Notifications;
use self::payments::Payments;
use self::users::Users;

const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'{')
    .add(b'}');

/// Encode an id so it always lands in exactly one path segment.
pub fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT_ENCODE_SET).to_string()
}

/// Accept ids sent as JSON strings or numbers.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Null(()),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Signed(number) => number.to_string(),
        RawId::Unsigned(number) => number.to_string(),
        RawId::Null(()) => String::new(),
    })
}

/// A backend record reachable under a REST collection.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection path with trailing slash, e.g. `/courses/`.
    const COLLECTION: &'static str;
    /// Route segment used by the admin API, e.g. `courses`.
    const SLUG: &'static str;
    /// Human label for toasts.
    const LABEL: &'static str;

    fn id(&self) -> &str;
}

/// CRUD over one [`Entity`] collection.
#[derive(Debug, Clone)]
pub struct Resource<T> {
    client: ApiClient,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Resource<T> {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    pub fn item_path(id: &str) -> String {
        format!("{}{}", T::COLLECTION, encode_segment(id))
    }

    pub async fn list(&self) -> Result<Vec<T>, ClientError> {
        self.client.get(T::COLLECTION, Auth::Anonymous).await
    }

    /// Listing that needs a token, for collections only admins may read.
    pub async fn list_with(&self, auth: Auth<'_>) -> Result<Vec<T>, ClientError> {
        self.client.get(T::COLLECTION, auth).await
    }

    /// Filtered listing; `filters` become query parameters.
    pub async fn search<Q>(&self, filters: &Q, auth: Auth<'_>) -> Result<Vec<T>, ClientError>
    where
        Q: Serialize + ?Sized,
    {
        self.client.get_query(T::COLLECTION, filters, auth).await
    }

    pub async fn get(&self, id: &str) -> Result<T, ClientError> {
        self.client.get(&Self::item_path(id), Auth::Anonymous).await
    }

    pub async fn create(&self, item: &T, auth: Auth<'_>) -> Result<T, ClientError> {
        self.client.post(T::COLLECTION, item, auth).await
    }

    pub async fn update(&self, id: &str, item: &T, auth: Auth<'_>) -> Result<T, ClientError> {
        self.client.put(&Self::item_path(id), item, auth).await
    }

    pub async fn delete(&self, id: &str, auth: Auth<'_>) -> Result<(), ClientError> {
        self.client
            .delete::<Value>(&Self::item_path(id), auth)
            .await
            .map(|_| ())
    }
}

/// Entry point handed to request handlers.
#[derive(Debug, Clone)]
pub struct Services {
    client: ApiClient,
}

impl Services {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn resource<T: Entity>(&self) -> Resource<T> {
        Resource::new(self.client.clone())
    }

    pub fn users(&self) -> Users {
        Users::new(self.client.clone())
    }

    pub fn admins(&self) -> Admins {
        Admins::new(self.client.clone())
    }

    pub fn bookings(&self) -> Bookings {
        Bookings::new(self.client.clone())
    }

    pub fn coupons(&self) -> Coupons {
        Coupons::new(self.client.clone())
    }

    pub fn gallery(&self) -> Gallery {
        Gallery::new(self.client.clone())
    }

    pub fn notifications(&self) -> Notifications {
        Notifications::new(self.client.clone())
    }

    pub fn payments(&self) -> Payments {
        Payments::new(self.client.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use serde_json::json;

    use super::courses::Course;
    use super::{encode_segment, Resource, Services};
    use crate::api::{ApiClient, Auth};

    #[test]
    fn ids_stay_in_one_segment() {
        assert_eq!(encode_segment("abc123"), "abc123");
        assert_eq!(encode_segment("../admins"), "..%2Fadmins");
        assert_eq!(Resource::<Course>::item_path("a b"), "/courses/a%20b");
    }

    #[tokio::test]
    async fn resource_crud_hits_collection_and_item_paths() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/courses/")
            .with_status(200)
            .with_body(r#"[{"_id": "c1", "title": "Open Water", "price": 420}]"#)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/courses/c1")
            .match_header("authorization", "Bearer admin-token")
            .match_body(mockito::Matcher::PartialJson(json!({"title": "Open Water Diver"})))
            .with_status(200)
            .with_body(r#"{"data": {"id": "c1", "title": "Open Water Diver", "price": 420}}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/courses/c1")
            .match_header("authorization", "Bearer admin-token")
            .with_status(200)
            .with_body(r#"{"message": "deleted"}"#)
            .create_async()
            .await;

        let services = Services::new(ApiClient::new(&server.url(), Duration::from_secs(5))?);
        let courses = services.resource::<Course>();

        let mut listed = courses.list().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "c1");

        listed[0].title = "Open Water Diver".into();
        let updated = courses
            .update("c1", &listed[0], Auth::Token("admin-token"))
            .await?;
        assert_eq!(updated.title, "Open Water Diver");

        courses.delete("c1", Auth::Token("admin-token")).await?;

        list.assert_async().await;
        update.assert_async().await;
        delete.assert_async().await;
        Ok(())
    }
}
