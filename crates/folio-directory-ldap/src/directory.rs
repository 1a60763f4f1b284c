//! LDAP directory client.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use folio_directory::{
    DirectoryClient, DirectoryError, DirectoryResult, ExternalIdentity, PageRequest,
};
use folio_model::Provider;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::LdapDirectoryConfig;

/// A bound connection and the instant the bind happened.
struct BoundConnection {
    ldap: Ldap,
    bound_at: Instant,
}

/// Directory client backed by an LDAP server.
///
/// Holds one bound connection and reuses it until the bind outlives
/// the configured `max_bind_age_secs`, then rebinds.
pub struct LdapDirectory {
    config: LdapDirectoryConfig,
    connection: Arc<RwLock<Option<BoundConnection>>>,
}

impl LdapDirectory {
    /// Create a new LDAP directory client with the given configuration.
    pub fn new(config: LdapDirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a bound connection, rebinding when the cached one has aged
    /// out.
    async fn connection(&self) -> DirectoryResult<Ldap> {
        let max_age = Duration::from_secs(self.config.max_bind_age_secs);

        {
            let guard = self.connection.read().await;
            if let Some(ref bound) = *guard {
                if bound.bound_at.elapsed() < max_age {
                    return Ok(bound.ldap.clone());
                }
                debug!("cached LDAP bind aged out, rebinding");
            }
        }

        let ldap = self.bind().await?;

        let mut guard = self.connection.write().await;
        *guard = Some(BoundConnection {
            ldap: ldap.clone(),
            bound_at: Instant::now(),
        });

        Ok(ldap)
    }

    /// Connect and bind with the configured credentials.
    async fn bind(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();
        debug!(url = %url, "connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        // Drive the connection until it closes.
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "performing LDAP bind");

        let result = ldap.simple_bind(bind_dn, bind_password).await.map_err(|e| {
            DirectoryError::connection_failed_with_source(
                format!("LDAP bind failed for {bind_dn}"),
                e,
            )
        })?;

        if result.rc != 0 {
            // 49: invalidCredentials
            if result.rc == 49 {
                return Err(DirectoryError::AuthenticationFailed);
            }
            return Err(DirectoryError::protocol(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, "LDAP bind established");

        Ok(ldap)
    }

    /// Run a user search and map the entries, skipping the ones that
    /// cannot be mapped.
    async fn search_users(&self, filter: &str) -> DirectoryResult<Vec<ExternalIdentity>> {
        let mut ldap = self.connection().await?;
        let base = self.config.user_dn();

        debug!(filter = %filter, base = %base, "searching LDAP users");

        let result = ldap
            .search(&base, Scope::Subtree, filter, self.requested_attributes())
            .await
            .map_err(|e| DirectoryError::protocol_with_source("LDAP user search failed", e))?;

        let (entries, _res) = result
            .success()
            .map_err(|e| DirectoryError::protocol(format!("LDAP user search failed: {e:?}")))?;

        let mut identities = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = SearchEntry::construct(entry);
            match self.map_entry(&entry) {
                Ok(identity) => identities.push(identity),
                Err(error) => warn!(dn = %entry.dn, %error, "skipping unmappable LDAP entry"),
            }
        }

        Ok(identities)
    }

    fn requested_attributes(&self) -> Vec<String> {
        let mut attrs = vec![
            self.config.external_id_attribute.clone(),
            self.config.username_attribute.clone(),
            self.config.email_attribute.clone(),
            self.config.member_of_attribute.clone(),
        ];
        if let Some(ref enabled) = self.config.enabled_attribute {
            attrs.push(enabled.clone());
        }
        attrs
    }

    /// Map one search entry to an external identity.
    fn map_entry(&self, entry: &SearchEntry) -> DirectoryResult<ExternalIdentity> {
        let external_id = first_attr(entry, &self.config.external_id_attribute).ok_or_else(|| {
            DirectoryError::invalid_entry(format!(
                "entry is missing {}",
                self.config.external_id_attribute
            ))
        })?;

        let username = first_attr(entry, &self.config.username_attribute).ok_or_else(|| {
            DirectoryError::invalid_entry(format!(
                "entry is missing {}",
                self.config.username_attribute
            ))
        })?;

        let email = first_attr(entry, &self.config.email_attribute);

        // Entries without the flag count as enabled.
        let enabled = match &self.config.enabled_attribute {
            Some(attribute) => first_attr(entry, attribute)
                .map(|value| parse_ldap_bool(&value))
                .unwrap_or(true),
            None => true,
        };

        let role_tokens = group_tokens(entry, &self.config.member_of_attribute);

        Ok(ExternalIdentity {
            external_id,
            username,
            email,
            enabled,
            // LDAP does not track email verification.
            email_verified: None,
            role_tokens: Some(role_tokens),
        })
    }

    /// DN of the group backing a role token.
    fn group_dn_for(&self, role_token: &str) -> String {
        format!("cn={},{}", escape_dn_value(role_token), self.config.group_dn())
    }

    /// Unbind and drop the cached connection.
    pub async fn dispose(&self) {
        let mut guard = self.connection.write().await;
        if let Some(mut bound) = guard.take() {
            if let Err(e) = bound.ldap.unbind().await {
                warn!(error = %e, "error during LDAP unbind");
            }
        }
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    fn provider(&self) -> Provider {
        Provider::Ldap
    }

    #[instrument(skip(self))]
    async fn list_page(&self, page: PageRequest) -> DirectoryResult<Vec<ExternalIdentity>> {
        let mut identities = self.search_users(&self.config.user_filter).await?;

        // LDAP paging is cookie-based (RFC 2696); a sorted slice of the
        // collected result keeps offset-based pages stable within a run.
        identities.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        let page = paginate(identities, page);

        debug!(returned = page.len(), "LDAP user page ready");
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn list_role_members_page(
        &self,
        role_token: &str,
        page: PageRequest,
    ) -> DirectoryResult<Vec<ExternalIdentity>> {
        let group_dn = self.group_dn_for(role_token);
        let filter = format!(
            "(&{}({}={}))",
            self.config.user_filter,
            self.config.member_of_attribute,
            escape_filter_value(&group_dn)
        );

        let mut members = self.search_users(&filter).await?;
        members.sort_by(|a, b| a.external_id.cmp(&b.external_id));

        Ok(paginate(members, page))
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> DirectoryResult<()> {
        let mut ldap = self.connection().await?;

        // Read the base entry to verify connectivity and access.
        let result = ldap
            .search(&self.config.base_dn, Scope::Base, "(objectClass=*)", vec!["dn"])
            .await
            .map_err(|e| DirectoryError::connection_failed_with_source("test search failed", e))?;

        let (entries, _res) = result
            .success()
            .map_err(|e| DirectoryError::connection_failed(format!("test search failed: {e:?}")))?;

        if entries.is_empty() {
            return Err(DirectoryError::connection_failed(format!(
                "base DN '{}' not found or not accessible",
                self.config.base_dn
            )));
        }

        info!("LDAP connection test successful");
        Ok(())
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// First value of an attribute, tolerating servers that echo attribute
/// names in a different case than requested.
fn first_attr(entry: &SearchEntry, name: &str) -> Option<String> {
    if let Some(values) = entry.attrs.get(name) {
        return values.first().cloned();
    }
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first().cloned())
}

/// Role tokens from the entry's group memberships: the first RDN value
/// of each group DN (`cn=editors,ou=groups,...` yields `editors`).
fn group_tokens(entry: &SearchEntry, member_of_attribute: &str) -> BTreeSet<String> {
    let Some(group_dns) = entry
        .attrs
        .get(member_of_attribute)
        .or_else(|| {
            entry
                .attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(member_of_attribute))
                .map(|(_, values)| values)
        })
    else {
        return BTreeSet::new();
    };

    group_dns
        .iter()
        .filter_map(|dn| group_token(dn))
        .collect()
}

/// First RDN value of a DN, if any.
fn group_token(dn: &str) -> Option<String> {
    let first_rdn = dn.split(',').next()?;
    let (_, value) = first_rdn.split_once('=')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse directory boolean values leniently ("TRUE", "true", "1",
/// "yes" are all true; anything else is false).
fn parse_ldap_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Cut one offset-based page out of a collected listing.
fn paginate<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.page_size as usize)
        .collect()
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// DN escaping is different from filter escaping: `, + " \ < > ; =`
/// always escape, NUL hex-escapes, space escapes only at the start or
/// end, `#` only at the start.
fn escape_dn_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == char_count - 1;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => {
                result.push_str("\\00");
            }
            ' ' if is_first || is_last => {
                result.push_str("\\20");
            }
            '#' if is_first => {
                result.push_str("\\23");
            }
            _ => {
                result.push(ch);
            }
        }
    }

    result
}
