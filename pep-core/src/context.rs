//! The [`Context`]: one connection per federation service plus the
//! user's secrets.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, SystemTime};

use base64::Engine as _;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use tracing::{error, info};

use pep_protocol::transport::Connection;

use crate::client::{
    AccessManagerConnection, AuthServerConnection, ClientConfig, FileCreationInfo,
    KeyServerConnection, RegistrationServerConnection, StorageFacilityConnection,
    TranscryptorConnection,
};
use crate::constellation::Constellation;
use crate::file::{FileInfo, FileReader, FileWriter, KEY_SIZE};
use crate::metadata::Metadata;
use crate::signing::CertifiedSigningPrivateKey;
use crate::ticket::{SignedTicket, TicketRequest};
use crate::triple::{symmetric_key_from_point, Triple};
use crate::Error;
use std::sync::Arc;

/// Options for constructing a [`Context`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Timeout put on socket writes. Default is no timeout.
    pub timeout: Option<Duration>,

    /// If set, [`Context::new`] succeeds even though one of the servers
    /// is down; the client reconnects on activity.
    pub patient: bool,
}

/// The user's secrets: signing key plus the two combined key-component
/// scalars.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// The certified signing key obtained at enrolment.
    pub signing_key: Option<CertifiedSigningPrivateKey>,

    /// Product of the encryption key components of AccessManager and
    /// Transcryptor.
    pub data_key: Option<Scalar>,

    /// Product of the pseudonymisation key components of AccessManager
    /// and Transcryptor.
    pub pseudonym_key: Option<Scalar>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SigningKeyRepr {
    private_key: String,
    certificate_chain: String,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SecretsRepr {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    signing_key: Option<SigningKeyRepr>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    data_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pseudonym_key: Option<String>,
}

fn scalar_b64(s: &Scalar) -> String {
    base64::engine::general_purpose::STANDARD.encode(s.to_bytes())
}

fn scalar_from_b64(encoded: &str) -> Result<Scalar, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| Error::Config(format!("scalar is not base64: {err}")))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Config(format!("scalar has length {}, not 32", bytes.len())))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
        .ok_or_else(|| Error::Config("non-canonical scalar".into()))
}

impl Serialize for Secrets {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let signing_key = self
            .signing_key
            .as_ref()
            .map(|sk| -> Result<SigningKeyRepr, Error> {
                Ok(SigningKeyRepr {
                    private_key: sk.private_key.to_pkcs8_pem()?,
                    certificate_chain: sk.certificate_chain.to_pem(),
                })
            })
            .transpose()
            .map_err(serde::ser::Error::custom)?;
        SecretsRepr {
            signing_key,
            data_key: self.data_key.as_ref().map(scalar_b64),
            pseudonym_key: self.pseudonym_key.as_ref().map(scalar_b64),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Secrets {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use crate::signing::{SigningCertificateChain, SigningPrivateKey};

        let repr = SecretsRepr::deserialize(deserializer)?;
        let signing_key = repr
            .signing_key
            .map(|sk| -> Result<CertifiedSigningPrivateKey, Error> {
                Ok(CertifiedSigningPrivateKey {
                    private_key: SigningPrivateKey::from_pkcs8_pem(&sk.private_key)?,
                    certificate_chain: SigningCertificateChain::from_pem(&sk.certificate_chain)?,
                })
            })
            .transpose()
            .map_err(serde::de::Error::custom)?;
        Ok(Secrets {
            signing_key,
            data_key: repr
                .data_key
                .as_deref()
                .map(scalar_from_b64)
                .transpose()
                .map_err(serde::de::Error::custom)?,
            pseudonym_key: repr
                .pseudonym_key
                .as_deref()
                .map(scalar_from_b64)
                .transpose()
                .map_err(serde::de::Error::custom)?,
        })
    }
}

/// Scope of an enumeration or history request.
#[derive(Debug, Clone, Default)]
pub struct EnumerateFilesOptions {
    /// Column groups to resolve into columns.
    pub column_groups: Vec<String>,
    /// Individual columns.
    pub columns: Vec<String>,
    /// Participant groups to resolve into pseudonyms.
    pub participant_groups: Vec<String>,
    /// Individual polymorphic pseudonyms.
    pub polymorphic_pseudonyms: Vec<Triple>,
    /// Request write access in addition to read access.
    pub request_write_access: bool,
}

/// A (participant, column) cell to create a file in.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Column to store under.
    pub column: String,
    /// The participant's polymorphic pseudonym.
    pub polymorphic_pseudonym: Triple,
}

struct SecretsState {
    secrets: Secrets,
    changed: bool,
}

/// A connected PEP client: one connection per federation service, the
/// user's secrets, and the constellation they live in.
pub struct Context {
    ks: KeyServerConnection,
    am: AccessManagerConnection,
    sf: StorageFacilityConnection,
    ts: TranscryptorConnection,
    rs: RegistrationServerConnection,
    auth: AuthServerConnection,

    // Guards secrets and the changed flag.
    secrets: StdMutex<SecretsState>,

    constellation: Constellation,
    data_pk: Option<RistrettoPoint>,
    pseudonym_pk: Option<RistrettoPoint>,

    secrets_path: PathBuf,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("secrets_path", &self.secrets_path)
            .field("enrolled", &self.enrolled())
            .finish()
    }
}

impl Context {
    /// Load the constellation and secrets files and connect to all six
    /// services concurrently. Dial failures are aggregated; with
    /// [`ContextOptions::patient`] they are tolerated instead.
    pub async fn new(
        constellation_path: impl AsRef<Path>,
        secrets_path: impl Into<PathBuf>,
        options: ContextOptions,
    ) -> Result<Context, Error> {
        let constellation = Constellation::load(constellation_path)?;
        let secrets_path = secrets_path.into();

        let secrets = if secrets_path.exists() {
            let buf = std::fs::read(&secrets_path)
                .map_err(|err| Error::Config(format!("read secrets file: {err}")))?;
            serde_json::from_slice(&buf)
                .map_err(|err| Error::Config(format!("decode secrets file: {err}")))?
        } else {
            Secrets::default()
        };

        let root_ca = constellation.root_ca()?;
        let data_pk = constellation.data_pk()?;
        let pseudonym_pk = constellation.pseudonym_pk()?;

        let conf = |addr: &String| ClientConfig {
            addr: addr.clone(),
            root_ca: root_ca.clone(),
            timeout: options.timeout,
            patient: options.patient,
        };

        // One dial per service; the service set and the join below must
        // stay in step.
        let ks_conf = conf(&constellation.key_server_addr);
        let am_conf = conf(&constellation.access_manager_addr);
        let sf_conf = conf(&constellation.storage_facility_addr);
        let ts_conf = conf(&constellation.transcryptor_addr);
        let rs_conf = conf(&constellation.registration_server_addr);
        let auth_conf = conf(&constellation.authserver_addr);
        let results = tokio::join!(
            KeyServerConnection::connect(&ks_conf),
            AccessManagerConnection::connect(&am_conf),
            StorageFacilityConnection::connect(&sf_conf),
            TranscryptorConnection::connect(&ts_conf),
            RegistrationServerConnection::connect(&rs_conf),
            AuthServerConnection::connect(&auth_conf),
        );

        match results {
            (Ok(ks), Ok(am), Ok(sf), Ok(ts), Ok(rs), Ok(auth)) => Ok(Context {
                ks,
                am,
                sf,
                ts,
                rs,
                auth,
                secrets: StdMutex::new(SecretsState {
                    secrets,
                    changed: false,
                }),
                constellation,
                data_pk,
                pseudonym_pk,
                secrets_path,
            }),
            (ks, am, sf, ts, rs, auth) => {
                let errors: Vec<Error> = [
                    ks.err(),
                    am.err(),
                    sf.err(),
                    ts.err(),
                    rs.err(),
                    auth.err(),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(match Error::collect(errors) {
                    Err(err) => err,
                    Ok(()) => Error::protocol("connect to federation failed"),
                })
            }
        }
    }

    /// Whether the context is enrolled right now.
    pub fn enrolled(&self) -> bool {
        self.enrolled_until(SystemTime::now())
    }

    /// Whether the context is enrolled now and expected to still be at
    /// instant `t`.
    pub fn enrolled_until(&self, t: SystemTime) -> bool {
        let state = self.secrets.lock().unwrap();
        match &state.secrets.signing_key {
            Some(sk) => !sk.certificate_chain.expired_on(t),
            None => false,
        }
    }

    /// Enrol, returning the resulting secrets instead of storing them.
    ///
    /// The KeyServer issues the certificate chain; the AccessManager and
    /// Transcryptor are then asked for their key components concurrently
    /// and every failure is retained.
    pub async fn enroll_user_return_secrets(&self, oauth_token: &str) -> Result<Secrets, Error> {
        let sk = self.ks.enroll_user(oauth_token).await?;

        let results = tokio::join!(
            self.am.request_user_key_components(&sk),
            self.ts.request_user_key_components(&sk),
        );
        let (am, ts) = match results {
            (Ok(am), Ok(ts)) => (am, ts),
            (am, ts) => {
                let errors: Vec<Error> = [am.err(), ts.err()].into_iter().flatten().collect();
                return Err(match Error::collect(errors) {
                    Err(err) => err,
                    Ok(()) => Error::protocol("key component request failed"),
                });
            }
        };

        // An absent encryption component counts as the zero scalar.
        let data_key =
            am.encryption.unwrap_or(Scalar::ZERO) * ts.encryption.unwrap_or(Scalar::ZERO);

        Ok(Secrets {
            signing_key: Some(sk),
            data_key: Some(data_key),
            pseudonym_key: Some(am.pseudonymisation * ts.pseudonymisation),
        })
    }

    /// Enrol and replace the stored secrets. Reenrolment is
    /// unconditional.
    pub async fn enroll_user(&self, oauth_token: &str) -> Result<(), Error> {
        let secrets = self.enroll_user_return_secrets(oauth_token).await?;
        let mut state = self.secrets.lock().unwrap();
        state.secrets = secrets;
        state.changed = true;
        Ok(())
    }

    /// Derive the polymorphic pseudonym for the given identity.
    pub fn derive_polymorphic_pseudonym(&self, id: &str) -> Result<Triple, Error> {
        let pk = self.pseudonym_pk.ok_or_else(|| {
            Error::Config(
                "cannot derive polymorphic pseudonym: is the pseudonym public key configured?"
                    .into(),
            )
        })?;
        let p = RistrettoPoint::hash_from_bytes::<Sha512>(id.as_bytes());
        Triple::encrypt(&p, &pk, &mut rand::thread_rng())
    }

    /// Generate a symmetric key and the polymorphic encryption key
    /// wrapping it.
    pub fn generate_encryption_key(&self) -> Result<(Triple, [u8; KEY_SIZE]), Error> {
        let pk = self.data_pk.ok_or_else(|| {
            Error::Config("cannot generate encryption key: is the data public key configured?".into())
        })?;
        let mut rng = rand::thread_rng();
        let p = RistrettoPoint::random(&mut rng);
        let triple = Triple::encrypt(&p, &pk, &mut rng)?;
        Ok((triple, symmetric_key_from_point(&p)))
    }

    /// Request a ticket for the given scope, returning it together with
    /// the signing key used.
    pub async fn get_ticket(
        &self,
        opts: &EnumerateFilesOptions,
    ) -> Result<(Arc<SignedTicket>, CertifiedSigningPrivateKey), Error> {
        let mut modes = vec!["read".to_string()];
        if opts.request_write_access {
            modes.push("write".to_string());
        }

        let signing_key = self
            .signing_key()
            .ok_or_else(|| Error::Auth("not enrolled".into()))?;

        let ticket = self
            .am
            .request_ticket(
                &signing_key,
                &TicketRequest {
                    modes,
                    participant_groups: opts.participant_groups.clone(),
                    polymorphic_pseudonyms: opts.polymorphic_pseudonyms.clone(),
                    column_groups: opts.column_groups.clone(),
                    columns: opts.columns.clone(),
                },
            )
            .await?;
        Ok((Arc::new(ticket), signing_key))
    }

    /// Enumerate files for the given scope.
    pub async fn enumerate_files(
        &self,
        opts: &EnumerateFilesOptions,
    ) -> Result<Vec<FileInfo>, Error> {
        let (ticket, signing_key) = self.get_ticket(opts).await?;
        self.sf.enumerate(&signing_key, &ticket).await
    }

    /// All stored versions of the files in the given scope, deletions
    /// filtered out, with full metadata.
    pub async fn file_versions(
        &self,
        opts: &EnumerateFilesOptions,
    ) -> Result<Vec<FileInfo>, Error> {
        let (ticket, signing_key) = self.get_ticket(opts).await?;
        let history = self.sf.history(&signing_key, &ticket).await?;

        let ids: Vec<Vec<u8>> = history
            .iter()
            .filter(|info| !info.identifier.is_empty()) // Skip deletions.
            .map(|info| info.identifier.as_bytes().to_vec())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.sf.retrieve_metadata(&signing_key, &ticket, &ids).await
    }

    /// Open previously enumerated files. The encrypted keys are
    /// translated by the AccessManager in a single batch.
    pub async fn open_files(&self, files: &[FileInfo]) -> Result<Vec<FileReader>, Error> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let secrets = self.secrets();
        let signing_key = secrets
            .signing_key
            .ok_or_else(|| Error::Auth("not enrolled".into()))?;
        let data_key = secrets
            .data_key
            .ok_or_else(|| Error::Auth("no data key; enroll first".into()))?;

        let mut metadata = Vec::with_capacity(files.len());
        let mut keys = Vec::with_capacity(files.len());
        for info in files {
            metadata.push(info.metadata.clone().ok_or_else(|| {
                Error::protocol(format!("file {} carries no metadata", info.identifier))
            })?);
            keys.push(info.encrypted_key.ok_or_else(|| {
                Error::protocol(format!("file {} carries no encrypted key", info.identifier))
            })?);
        }

        let translated = self
            .am
            .request_encryption_keys(&signing_key, &files[0].ticket, &metadata, &keys, false)
            .await?;

        let mut readers = Vec::with_capacity(files.len());
        for (i, info) in files.iter().enumerate() {
            let key = symmetric_key_from_point(&translated[i].decrypt(&data_key));
            readers.push(
                self.sf
                    .open(
                        &signing_key,
                        &info.ticket,
                        &info.identifier,
                        &key,
                        &metadata[i],
                        info.file_size,
                    )
                    .await?,
            );
        }
        Ok(readers)
    }

    /// Open a single file from a [`FileInfo`]. Reuses the record's
    /// ticket when it grants reading, requests a fresh one otherwise.
    pub async fn open_file(&self, info: &FileInfo) -> Result<FileReader, Error> {
        let secrets = self.secrets();
        let signing_key = secrets
            .signing_key
            .ok_or_else(|| Error::Auth("not enrolled".into()))?;
        let data_key = secrets
            .data_key
            .ok_or_else(|| Error::Auth("no data key; enroll first".into()))?;

        let metadata = info.metadata.clone().ok_or_else(|| {
            Error::protocol(format!("file {} carries no metadata", info.identifier))
        })?;
        let encrypted_key = info.encrypted_key.ok_or_else(|| {
            Error::protocol(format!("file {} carries no encrypted key", info.identifier))
        })?;

        let ticket = if info.ticket.has_mode("read") {
            info.ticket.clone()
        } else {
            let pp = info.polymorphic_pseudonym().copied().ok_or_else(|| {
                Error::protocol("file carries no polymorphic pseudonym to request a ticket for")
            })?;
            Arc::new(
                self.am
                    .request_ticket(
                        &signing_key,
                        &TicketRequest {
                            modes: vec!["read".to_string()],
                            polymorphic_pseudonyms: vec![pp],
                            columns: vec![info.column.clone()],
                            ..Default::default()
                        },
                    )
                    .await?,
            )
        };

        let translated = self
            .am
            .request_encryption_key(&signing_key, &ticket, &metadata, &encrypted_key, false)
            .await?;
        let key = symmetric_key_from_point(&translated.decrypt(&data_key));

        self.sf
            .open(
                &signing_key,
                &ticket,
                &info.identifier,
                &key,
                &metadata,
                info.file_size,
            )
            .await
    }

    /// Enumerate and read all files in the given scope.
    pub async fn enumerate_and_read_files(
        &self,
        opts: &EnumerateFilesOptions,
    ) -> Result<(Vec<Vec<u8>>, Vec<FileInfo>), Error> {
        let files = self.enumerate_files(opts).await?;
        let readers = self.open_files(&files).await?;
        Ok((Self::read_open_files(readers).await?, files))
    }

    /// Read all file versions in the given scope.
    pub async fn history_and_read_files(
        &self,
        opts: &EnumerateFilesOptions,
    ) -> Result<(Vec<Vec<u8>>, Vec<FileInfo>), Error> {
        let files = self.file_versions(opts).await?;
        let readers = self.open_files(&files).await?;
        Ok((Self::read_open_files(readers).await?, files))
    }

    /// Drain the given readers fully, closing each.
    pub async fn read_open_files(readers: Vec<FileReader>) -> Result<Vec<Vec<u8>>, Error> {
        let mut out = Vec::with_capacity(readers.len());
        for mut reader in readers {
            out.push(reader.read_to_end().await?);
            reader.close().await?;
        }
        Ok(out)
    }

    /// Create one file per cell, all multiplexed on a single store
    /// stream under one write ticket.
    pub async fn create_files(&self, cells: &[Cell]) -> Result<Vec<FileWriter>, Error> {
        let signing_key = self
            .signing_key()
            .ok_or_else(|| Error::Auth("not enrolled".into()))?;

        let ticket = Arc::new(
            self.am
                .request_ticket(
                    &signing_key,
                    &TicketRequest {
                        modes: vec!["write".to_string()],
                        polymorphic_pseudonyms: cells
                            .iter()
                            .map(|cell| cell.polymorphic_pseudonym)
                            .collect(),
                        columns: cells.iter().map(|cell| cell.column.clone()).collect(),
                        ..Default::default()
                    },
                )
                .await?,
        );

        let mut files = Vec::with_capacity(cells.len());
        for cell in cells {
            let metadata = Metadata::new(&cell.column);
            let (encryption_key, key) = self.generate_encryption_key()?;
            let blinded = self
                .am
                .request_encryption_key(&signing_key, &ticket, &metadata, &encryption_key, true)
                .await?;
            files.push(FileCreationInfo {
                metadata,
                polymorphic_pseudonym: cell.polymorphic_pseudonym,
                column: cell.column.clone(),
                encrypted_key: blinded,
                key,
            });
        }

        self.sf.create(&signing_key, &ticket, &files).await
    }

    /// Create a single file and return its writer.
    pub async fn create_file(
        &self,
        polymorphic_pseudonym: &Triple,
        column: &str,
    ) -> Result<FileWriter, Error> {
        let mut writers = self
            .create_files(&[Cell {
                column: column.to_string(),
                polymorphic_pseudonym: *polymorphic_pseudonym,
            }])
            .await?;
        writers
            .pop()
            .ok_or_else(|| Error::protocol("store stream yielded no writer"))
    }

    /// Create a file, write `contents`, and return the identifier the
    /// StorageFacility assigned.
    pub async fn create_file_from_bytes(
        &self,
        polymorphic_pseudonym: &Triple,
        column: &str,
        contents: &[u8],
    ) -> Result<String, Error> {
        let mut writer = self.create_file(polymorphic_pseudonym, column).await?;
        writer.write(contents).await?;
        writer.close().await?;
        writer.identifier().await
    }

    /// Persist the secrets, atomically and at mode 0600, when they have
    /// changed since the last save.
    pub fn save_secrets(&self) -> Result<(), Error> {
        let (secrets, changed) = {
            let mut state = self.secrets.lock().unwrap();
            let changed = state.changed;
            state.changed = false;
            (state.secrets.clone(), changed)
        };
        if !changed {
            return Ok(());
        }

        info!(path = %self.secrets_path.display(), "writing secrets");
        let buf = serde_json::to_vec_pretty(&secrets)
            .map_err(|err| Error::Config(format!("encode secrets: {err}")))?;

        let dir = self
            .secrets_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write as _;
        tmp.write_all(&buf)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(&self.secrets_path)
            .map_err(|err| Error::Io(err.error))?;
        Ok(())
    }

    /// Close every connection and persist the secrets.
    pub async fn close(&self) {
        self.am.close().await;
        self.ts.close().await;
        self.ks.close().await;
        self.sf.close().await;
        self.rs.close().await;
        self.auth.close().await;
        if let Err(err) = self.save_secrets() {
            error!(error = %err, "failed to write secrets");
        }
    }

    /// The PEP servers of the constellation, by name.
    pub fn servers(&self) -> Vec<(&'static str, &Connection)> {
        vec![
            ("KeyServer", self.ks.conn()),
            ("AccessManager", self.am.conn()),
            ("Transcryptor", self.ts.conn()),
            ("StorageFacility", self.sf.conn()),
            ("RegistrationServer", self.rs.conn()),
            ("Authserver", self.auth.conn()),
        ]
    }

    /// The KeyServer connection.
    pub fn ks(&self) -> &KeyServerConnection {
        &self.ks
    }

    /// The AccessManager connection.
    pub fn am(&self) -> &AccessManagerConnection {
        &self.am
    }

    /// The Transcryptor connection.
    pub fn ts(&self) -> &TranscryptorConnection {
        &self.ts
    }

    /// The StorageFacility connection.
    pub fn sf(&self) -> &StorageFacilityConnection {
        &self.sf
    }

    /// The RegistrationServer connection.
    pub fn rs(&self) -> &RegistrationServerConnection {
        &self.rs
    }

    /// The AuthServer connection.
    pub fn auth(&self) -> &AuthServerConnection {
        &self.auth
    }

    /// The constellation this context lives in.
    pub fn constellation(&self) -> &Constellation {
        &self.constellation
    }

    /// The signing key, if enrolled.
    pub fn signing_key(&self) -> Option<CertifiedSigningPrivateKey> {
        self.secrets.lock().unwrap().secrets.signing_key.clone()
    }

    /// The data key, if enrolled.
    pub fn data_key(&self) -> Option<Scalar> {
        self.secrets.lock().unwrap().secrets.data_key
    }

    /// The pseudonym key, if enrolled.
    pub fn pseudonym_key(&self) -> Option<Scalar> {
        self.secrets.lock().unwrap().secrets.pseudonym_key
    }

    /// A copy of the current secrets.
    pub fn secrets(&self) -> Secrets {
        self.secrets.lock().unwrap().secrets.clone()
    }

    /// Replace the secrets without persisting them.
    pub fn set_secrets(&self, secrets: Secrets) {
        self.secrets.lock().unwrap().secrets = secrets;
    }
}
