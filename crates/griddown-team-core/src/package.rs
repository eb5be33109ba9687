//! Team packages for out-of-band sharing
//!
//! A team travels between devices in one of three shapes:
//!
//! | shape       | discriminator                      | secrecy                    |
//! |-------------|------------------------------------|----------------------------|
//! | invite code | `GDTEAM:` prefix                   | none, passphrase in clear  |
//! | display     | `"type": "griddown_team_package"`  | none                       |
//! | encrypted   | `"type": "griddown_team_encrypted"`| passphrase (AES-GCM)       |
//!
//! [`TeamPackage::parse`] resolves the discriminator and
//! [`TeamPackage::into_seed`] decrypts as needed, yielding the [`TeamSeed`]
//! a new local team record is built from.
//!
//! Invite codes are meant for QR codes and carry the passphrase in plain
//! text; hand them out over a trusted channel.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{legacy, PassphraseCipher};
use crate::error::{TeamError, TeamResult};
use crate::types::{CommPlan, RallyPoint, Role, Team, TeamId, TeamSettings};

/// Prefix of encoded invite codes
pub const INVITE_PREFIX: &str = "GDTEAM:";

/// Display package discriminator
pub const DISPLAY_PACKAGE_TYPE: &str = "griddown_team_package";

/// Encrypted package discriminator
pub const ENCRYPTED_PACKAGE_TYPE: &str = "griddown_team_encrypted";

/// File extension for exported encrypted packages
pub const PACKAGE_FILE_EXTENSION: &str = "gdteam";

/// Current package format version
pub const PACKAGE_VERSION: u32 = 1;

const INVITE_NAME_LEN: usize = 16;
const INVITE_PSK_LEN: usize = 24;

/// Minimal join data, sized to fit a scannable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    #[serde(rename = "t")]
    pub team_id: TeamId,
    /// Team name, truncated to 16 characters
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "c")]
    pub mesh_channel: String,
    /// Mesh PSK, truncated to 24 characters
    #[serde(rename = "k")]
    pub mesh_psk: String,
    #[serde(rename = "p")]
    pub passphrase: String,
}

impl InviteCode {
    /// Build an invite from a team record.
    ///
    /// # Errors
    ///
    /// Returns `TeamError::PassphraseRequired` if the team has no passphrase.
    pub fn from_team(team: &Team) -> TeamResult<Self> {
        let passphrase = team
            .passphrase
            .clone()
            .ok_or(TeamError::PassphraseRequired)?;
        Ok(Self {
            team_id: team.id.clone(),
            name: team.name.chars().take(INVITE_NAME_LEN).collect(),
            mesh_channel: team.mesh_channel.clone(),
            mesh_psk: team.mesh_psk.chars().take(INVITE_PSK_LEN).collect(),
            passphrase,
        })
    }

    /// Encode as `GDTEAM:{base64 json}`
    pub fn encode(&self) -> TeamResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{}{}", INVITE_PREFIX, STANDARD.encode(json)))
    }

    /// Decode a `GDTEAM:{base64 json}` string.
    ///
    /// # Errors
    ///
    /// Returns `TeamError::InvalidPackageFormat` if the prefix, base64 or
    /// JSON is wrong.
    pub fn decode(s: &str) -> TeamResult<Self> {
        let data = s.trim().strip_prefix(INVITE_PREFIX).ok_or_else(|| {
            TeamError::InvalidPackageFormat(format!(
                "Invalid prefix: expected '{}', got '{}'",
                INVITE_PREFIX,
                s.chars().take(10).collect::<String>()
            ))
        })?;

        let bytes = STANDARD
            .decode(data)
            .map_err(|e| TeamError::InvalidPackageFormat(format!("Invalid base64: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| TeamError::InvalidPackageFormat(format!("Invalid invite data: {}", e)))
    }
}

/// Encode `team` as a compact invite code
pub fn build_invite(team: &Team) -> TeamResult<String> {
    InviteCode::from_team(team)?.encode()
}

/// Decode an invite code without joining, e.g. to preview it
pub fn parse_invite(code: &str) -> TeamResult<InviteCode> {
    InviteCode::decode(code)
}

/// What an inviter chooses to include beyond the basics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageOptions {
    pub include_rally_points: bool,
    pub include_comm_plan: bool,
}

impl PackageOptions {
    /// Include everything optional
    pub fn full() -> Self {
        Self {
            include_rally_points: true,
            include_comm_plan: true,
        }
    }
}

/// Name and role of a member, without ids or positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub name: String,
    pub role: Role,
}

/// Unencrypted team package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPackage {
    pub version: u32,
    /// Creation time of the package (unix ms)
    pub created: i64,
    pub team_id: TeamId,
    pub team_name: String,
    #[serde(default)]
    pub team_description: String,
    pub mesh_channel: String,
    #[serde(rename = "meshPSK")]
    pub mesh_psk: String,
    pub member_count: usize,
    #[serde(default)]
    pub member_list: Vec<MemberSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rally_points: Option<Vec<RallyPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comm_plan: Option<CommPlan>,
    #[serde(default)]
    pub settings: TeamSettings,
}

impl DisplayPackage {
    pub fn from_team(team: &Team, options: PackageOptions, now: i64) -> Self {
        Self {
            version: PACKAGE_VERSION,
            created: now,
            team_id: team.id.clone(),
            team_name: team.name.clone(),
            team_description: team.description.clone(),
            mesh_channel: team.mesh_channel.clone(),
            mesh_psk: team.mesh_psk.clone(),
            member_count: team.members.len(),
            member_list: team
                .members
                .iter()
                .map(|m| MemberSummary {
                    name: m.name.clone(),
                    role: m.role,
                })
                .collect(),
            rally_points: options
                .include_rally_points
                .then(|| team.rally_points.clone()),
            comm_plan: options.include_comm_plan.then(|| team.comm_plan.clone()),
            settings: team.settings.clone(),
        }
    }

    /// Serialize with its `type` discriminator
    pub fn to_json(&self) -> TeamResult<String> {
        Ok(serde_json::to_string_pretty(&JsonPackage::Display(
            self.clone(),
        ))?)
    }
}

/// Cipher used for an encrypted package's `data`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionScheme {
    #[serde(rename = "aes-gcm")]
    AesGcm,
    /// Pre-AES exports; also assumed when the tag is missing
    #[default]
    #[serde(rename = "legacy-xor")]
    LegacyXor,
}

/// Passphrase-encrypted team package (`.gdteam` file body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPackage {
    pub version: u32,
    #[serde(default)]
    pub encryption: EncryptionScheme,
    pub team_id: TeamId,
    pub team_name: String,
    pub member_count: usize,
    /// Crypto envelope around a serialized display package
    pub data: String,
}

impl EncryptedPackage {
    /// Encrypt a display package with AES-GCM
    pub async fn seal(
        display: &DisplayPackage,
        passphrase: &str,
        cipher: PassphraseCipher,
    ) -> TeamResult<Self> {
        let plaintext = display.to_json()?.into_bytes();
        let data = cipher
            .encrypt_async(plaintext, passphrase.to_string())
            .await?;
        Ok(Self {
            version: PACKAGE_VERSION,
            encryption: EncryptionScheme::AesGcm,
            team_id: display.team_id.clone(),
            team_name: display.team_name.clone(),
            member_count: display.member_count,
            data,
        })
    }

    /// Decrypt and parse the inner display package
    pub async fn open(
        &self,
        passphrase: &str,
        cipher: PassphraseCipher,
    ) -> TeamResult<DisplayPackage> {
        let plaintext = match self.encryption {
            EncryptionScheme::AesGcm => {
                cipher
                    .decrypt_async(self.data.clone(), passphrase.to_string())
                    .await?
            }
            EncryptionScheme::LegacyXor => legacy::decrypt(&self.data, passphrase)?,
        };

        let text = String::from_utf8(plaintext)
            .map_err(|_| TeamError::DecryptionFailed("payload is not UTF-8".to_string()))?;

        match TeamPackage::parse(&text)? {
            TeamPackage::Display(display) => Ok(display),
            TeamPackage::Invite(_) | TeamPackage::Encrypted(_) => Err(
                TeamError::InvalidPackageFormat("encrypted payload is not a team package".to_string()),
            ),
        }
    }

    /// Serialize with its `type` discriminator
    pub fn to_json(&self) -> TeamResult<String> {
        Ok(serde_json::to_string_pretty(&JsonPackage::Encrypted(
            self.clone(),
        ))?)
    }

    /// Suggested file name for an export, e.g. `ridge-team.gdteam`
    pub fn file_name(&self) -> String {
        let slug: String = self
            .team_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let slug = slug.trim_matches('-');
        let slug = if slug.is_empty() { "team" } else { slug };
        format!("{}.{}", slug, PACKAGE_FILE_EXTENSION)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum JsonPackage {
    #[serde(rename = "griddown_team_package")]
    Display(DisplayPackage),
    #[serde(rename = "griddown_team_encrypted")]
    Encrypted(EncryptedPackage),
}

/// Any of the three package shapes
#[derive(Debug, Clone, PartialEq)]
pub enum TeamPackage {
    Invite(InviteCode),
    Display(DisplayPackage),
    Encrypted(EncryptedPackage),
}

impl TeamPackage {
    /// Detect the package shape and parse it.
    ///
    /// # Errors
    ///
    /// Returns `TeamError::InvalidPackageFormat` for empty input, unknown
    /// discriminators and malformed bodies.
    pub fn parse(input: &str) -> TeamResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TeamError::InvalidPackageFormat("empty input".to_string()));
        }

        if input.starts_with(INVITE_PREFIX) {
            return InviteCode::decode(input).map(TeamPackage::Invite);
        }

        let value: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| TeamError::InvalidPackageFormat(format!("not JSON: {}", e)))?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some(DISPLAY_PACKAGE_TYPE) | Some(ENCRYPTED_PACKAGE_TYPE) => {}
            Some(other) => {
                return Err(TeamError::InvalidPackageFormat(format!(
                    "unknown package type '{}'",
                    other
                )))
            }
            None => {
                return Err(TeamError::InvalidPackageFormat(
                    "missing package type".to_string(),
                ))
            }
        }

        let package: JsonPackage = serde_json::from_value(value)
            .map_err(|e| TeamError::InvalidPackageFormat(e.to_string()))?;

        Ok(match package {
            JsonPackage::Display(display) => TeamPackage::Display(display),
            JsonPackage::Encrypted(encrypted) => TeamPackage::Encrypted(encrypted),
        })
    }

    /// Whether importing needs a passphrase
    pub fn requires_passphrase(&self) -> bool {
        matches!(self, TeamPackage::Encrypted(_))
    }

    pub fn team_id(&self) -> &TeamId {
        match self {
            TeamPackage::Invite(code) => &code.team_id,
            TeamPackage::Display(display) => &display.team_id,
            TeamPackage::Encrypted(encrypted) => &encrypted.team_id,
        }
    }

    /// Resolve the package into join data, decrypting if needed.
    ///
    /// # Errors
    ///
    /// - `TeamError::PassphraseRequired` for encrypted packages without a passphrase
    /// - `TeamError::DecryptionFailed` for a wrong passphrase or corrupt data
    pub async fn into_seed(
        self,
        passphrase: Option<&str>,
        cipher: PassphraseCipher,
    ) -> TeamResult<TeamSeed> {
        match self {
            TeamPackage::Invite(code) => Ok(TeamSeed {
                team_id: code.team_id,
                name: code.name,
                description: String::new(),
                mesh_channel: code.mesh_channel,
                mesh_psk: code.mesh_psk,
                passphrase: Some(code.passphrase),
                rally_points: Vec::new(),
                comm_plan: None,
                settings: None,
            }),
            TeamPackage::Display(display) => {
                Ok(TeamSeed::from_display(display, passphrase.map(str::to_string)))
            }
            TeamPackage::Encrypted(encrypted) => {
                let passphrase = passphrase
                    .filter(|p| !p.is_empty())
                    .ok_or(TeamError::PassphraseRequired)?;
                let display = encrypted.open(passphrase, cipher).await?;
                Ok(TeamSeed::from_display(display, Some(passphrase.to_string())))
            }
        }
    }
}

/// Fields a freshly joined team record is built from
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSeed {
    pub team_id: TeamId,
    pub name: String,
    pub description: String,
    pub mesh_channel: String,
    pub mesh_psk: String,
    pub passphrase: Option<String>,
    pub rally_points: Vec<RallyPoint>,
    pub comm_plan: Option<CommPlan>,
    pub settings: Option<TeamSettings>,
}

impl TeamSeed {
    fn from_display(display: DisplayPackage, passphrase: Option<String>) -> Self {
        Self {
            team_id: display.team_id,
            name: display.team_name,
            description: display.team_description,
            mesh_channel: display.mesh_channel,
            mesh_psk: display.mesh_psk,
            passphrase,
            rally_points: display.rally_points.unwrap_or_default(),
            comm_plan: display.comm_plan,
            settings: Some(display.settings),
        }
    }
}
