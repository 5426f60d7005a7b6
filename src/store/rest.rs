use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::{RemoteStore, StoreError};
use crate::models::{
    AppointmentRow, BookingStatus, CustomerRow, NewAppointmentRow, NewCustomerRow,
    TABLE_APPOINTMENTS, TABLE_CUSTOMERS,
};

/// PostgREST client for the hosted project (`{project}/rest/v1/{table}`).
#[derive(Clone)]
pub struct RestStore {
    http: Client,
    base: Url,
    api_key: String,
}

impl RestStore {
    pub fn new(project_url: &Url, api_key: &str, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let base = rest_base(project_url)?;
        Ok(Self {
            http,
            base,
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.base
            .join(table)
            .map_err(|err| StoreError::Malformed(format!("bad table url for {table}: {err}")))
    }

    fn with_auth(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let url = self.table_url(table)?;
        let resp = self.with_auth(self.http.get(url)).query(query).send().await?;
        let resp = check(resp).await?;
        Ok(resp.json::<Vec<T>>().await?)
    }

    async fn insert_row<B, T>(&self, table: &str, body: &B) -> Result<T, StoreError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.table_url(table)?;
        let resp = self
            .with_auth(self.http.post(url))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json::<Vec<T>>()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed(format!("insert into {table} returned no rows")))
    }
}

fn rest_base(project_url: &Url) -> Result<Url, StoreError> {
    let mut root = project_url.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join("rest/v1/")
        .map_err(|err| StoreError::Malformed(format!("bad project url {project_url}: {err}")))
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

async fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select_customers(&self) -> Result<Vec<CustomerRow>, StoreError> {
        self.fetch_rows(
            TABLE_CUSTOMERS,
            &[("select", "*".to_string()), ("order", "created_at.asc".to_string())],
        )
        .await
    }

    async fn select_appointments(&self) -> Result<Vec<AppointmentRow>, StoreError> {
        self.fetch_rows(
            TABLE_APPOINTMENTS,
            &[("select", "*".to_string()), ("order", "booking_time.desc".to_string())],
        )
        .await
    }

    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<CustomerRow>, StoreError> {
        let rows: Vec<CustomerRow> = self
            .fetch_rows(
                TABLE_CUSTOMERS,
                &[
                    ("select", "*".to_string()),
                    ("phone_number", eq(phone)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_customer(&self, customer: &NewCustomerRow) -> Result<CustomerRow, StoreError> {
        self.insert_row(TABLE_CUSTOMERS, customer).await
    }

    async fn insert_appointment(
        &self,
        appointment: &NewAppointmentRow,
    ) -> Result<AppointmentRow, StoreError> {
        self.insert_row(TABLE_APPOINTMENTS, appointment).await
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        let url = self.table_url(TABLE_APPOINTMENTS)?;
        let resp = self
            .with_auth(self.http.patch(url))
            .query(&[("id", eq(id))])
            .json(&json!({ "status": status.as_str() }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete_appointment(&self, id: &str) -> Result<(), StoreError> {
        let url = self.table_url(TABLE_APPOINTMENTS)?;
        let resp = self
            .with_auth(self.http.delete(url))
            .query(&[("id", eq(id))])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_urls_hang_off_rest_v1() {
        let project = Url::parse("https://demo.supabase.co").unwrap();
        let store = RestStore::new(&project, "anon", None).unwrap();
        assert_eq!(
            store.table_url(TABLE_APPOINTMENTS).unwrap().as_str(),
            "https://demo.supabase.co/rest/v1/appointments"
        );
    }

    #[test]
    fn project_path_prefix_is_preserved() {
        let project = Url::parse("https://gateway.example.com/spa").unwrap();
        let base = rest_base(&project).unwrap();
        assert_eq!(base.as_str(), "https://gateway.example.com/spa/rest/v1/");
    }

    #[test]
    fn filters_use_postgrest_eq_syntax() {
        assert_eq!(eq("0901234567"), "eq.0901234567");
    }
}
