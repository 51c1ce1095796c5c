use crate::Error;
use std::{fs, path::PathBuf};
use std::path::Path;
use argon2::password_hash::PasswordHash;
use rocket::serde::{Serialize, Deserialize};
use tracing::error;


/// Name of the main config file in the app's folder
pub const FILENAME: &'static str = "cariboushots.config";


/// The app's config
#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// IP address to serve on.
    /// Default : 127.0.0.1
    #[serde(default="config_default_address")]
    pub ADDRESS: String,

    /// Port to serve on.
    /// Default : 8000
    #[serde(default="config_default_port")]
    pub PORT: u16,

    /// Name of the club, displayed in the page title and the navigation bar.
    #[serde(default="config_default_title")]
    pub TITLE: String,

    /// ID of the folder at the top of the gallery in the storage backend. Navigation never
    /// goes above it, and uploads without a subfolder land in it.
    /// Required.
    pub ROOT_FOLDER_ID: String,

    /// Path to the JSON key file of the service account used to access the storage backend.
    /// Default : "instance/service_account_credentials.json" in the app's folder
    #[serde(default="config_default_credentials_path")]
    pub CREDENTIALS_PATH: String,

    /// Username of the club member allowed to upload photos.
    /// Default : "member"
    #[serde(default="config_default_member_username")]
    pub MEMBER_USERNAME: String,

    /// Argon2 hash (PHC string format) of the member's password.
    /// Required.
    #[serde(skip_serializing)]
    pub MEMBER_PASSWORD_HASH: String,

    /// Key used to encrypt the session cookie, as expected by Rocket's `secret_key`
    /// (for example the output of `openssl rand -base64 32`). Required in release builds.
    #[serde(default, skip_serializing)]
    pub SECRET_KEY: String,

    /// Maximum number of photos listed in a folder. There is no pagination : photos beyond
    /// this number are not shown, and folder tiles never count more than this.
    /// Default : 50
    #[serde(default="config_default_photos_page_size")]
    pub PHOTOS_PAGE_SIZE: u32,

    /// Maximum number of subfolders listed in a folder.
    /// Default : 100
    #[serde(default="config_default_folders_page_size")]
    pub FOLDERS_PAGE_SIZE: u32,

    /// Number of folders whose photos are listed simultaneously to build the folder tiles.
    /// Default : 4
    #[serde(default="config_default_enrich_concurrency")]
    pub ENRICH_CONCURRENCY: usize,

    /// Timeout of every request sent to the storage backend, in seconds.
    /// Default : 30
    #[serde(default="config_default_request_timeout")]
    pub REQUEST_TIMEOUT: u64,

    /// Maximum size of an uploaded photo, in MiB.
    /// Default : 32
    #[serde(default="config_default_max_upload_size")]
    pub MAX_UPLOAD_SIZE: u64,

    /// Image shown for photos which don't have a thumbnail in the storage backend.
    /// Default : "/static/images/placeholder_image.svg"
    #[serde(default="config_default_placeholder_image")]
    pub PLACEHOLDER_IMAGE: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ADDRESS: config_default_address(),
            PORT: config_default_port(),
            TITLE: config_default_title(),
            ROOT_FOLDER_ID: String::new(),
            CREDENTIALS_PATH: config_default_credentials_path(),
            MEMBER_USERNAME: config_default_member_username(),
            MEMBER_PASSWORD_HASH: String::new(),
            SECRET_KEY: String::new(),
            PHOTOS_PAGE_SIZE: config_default_photos_page_size(),
            FOLDERS_PAGE_SIZE: config_default_folders_page_size(),
            ENRICH_CONCURRENCY: config_default_enrich_concurrency(),
            REQUEST_TIMEOUT: config_default_request_timeout(),
            MAX_UPLOAD_SIZE: config_default_max_upload_size(),
            PLACEHOLDER_IMAGE: config_default_placeholder_image(),
        }
    }
}

impl Config {

    /// Read the main config file and deserialize it into a Config struct
    pub fn read() -> Result<Self, Error> {
        Self::read_path(FILENAME)
    }

    /// Read the config file at the given location, deserialize it into a Config struct and
    /// check its content
    pub fn read_path<P>(path: P) -> Result<Self, Error>
        where P: AsRef<Path>
    {
        Self::parse(Self::read_path_as_string(path)?.as_str())
    }

    /// Deserialize the given TOML content into a Config struct and check its content
    pub fn parse(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to read and parse the config file
    /// In case of error, log it and exit with a status code of -1
    pub fn read_or_exit() -> Self {
        // Read the config file and parse it into a Config struct
        Self::read()
            .unwrap_or_else(|e| {
                match e {
                    Error::FileError(error, path) => {
                        error!("unable to open the config file \"{}\" : {}", path.display(), error);
                    }
                    Error::TomlParserError(error) => {
                        error!("unable to parse the config file \"{}\" : {}", FILENAME, error);
                    }
                    error => {
                        error!("invalid config file \"{}\" : {}", FILENAME, error);
                    }
                }
                std::process::exit(-1);
            })
    }

    /// Read the config file at the given location and return it as a simple String
    pub fn read_path_as_string<P>(path: P) -> Result<String, Error>
        where P: AsRef<Path>
    {
        fs::read_to_string(&path)
            .map_err(|e| Error::FileError(e, PathBuf::from(path.as_ref())))
    }

    /// Check the values that can't be checked by the deserializer
    pub fn validate(&self) -> Result<(), Error> {
        if self.ROOT_FOLDER_ID.trim().is_empty() {
            return Err(Error::InvalidConfig("ROOT_FOLDER_ID must not be empty".to_string()));
        }
        if self.MEMBER_USERNAME.trim().is_empty() {
            return Err(Error::InvalidConfig("MEMBER_USERNAME must not be empty".to_string()));
        }
        PasswordHash::new(&self.MEMBER_PASSWORD_HASH)
            .map_err(|e| Error::InvalidConfig(format!("MEMBER_PASSWORD_HASH is not a valid password hash : {e}")))?;
        if self.PHOTOS_PAGE_SIZE == 0 || self.FOLDERS_PAGE_SIZE == 0 {
            return Err(Error::InvalidConfig("page sizes must be greater than 0".to_string()));
        }
        Ok(())
    }

}


// Default values for config keys

fn config_default_address() -> String {
    "127.0.0.1".to_string()
}

fn config_default_port() -> u16 {
    8000
}

fn config_default_title() -> String {
    "Caribou'Shots".to_string()
}

fn config_default_credentials_path() -> String {
    "instance/service_account_credentials.json".to_string()
}

fn config_default_member_username() -> String {
    "member".to_string()
}

fn config_default_photos_page_size() -> u32 {
    50
}

fn config_default_folders_page_size() -> u32 {
    100
}

fn config_default_enrich_concurrency() -> usize {
    4
}

fn config_default_request_timeout() -> u64 {
    30 // s
}

fn config_default_max_upload_size() -> u64 {
    32 // MiB
}

fn config_default_placeholder_image() -> String {
    "/static/images/placeholder_image.svg".to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::password_hash;

    #[test]
    fn minimal_config_uses_defaults() {
        let hash = password_hash("caribou");
        let config = Config::parse(&format!("ROOT_FOLDER_ID = \"abc\"\nMEMBER_PASSWORD_HASH = '{hash}'\n")).unwrap();
        assert_eq!(config.ROOT_FOLDER_ID, "abc");
        assert_eq!(config.PORT, 8000);
        assert_eq!(config.PHOTOS_PAGE_SIZE, 50);
        assert_eq!(config.MEMBER_USERNAME, "member");
        assert_eq!(config.PLACEHOLDER_IMAGE, "/static/images/placeholder_image.svg");
    }

    #[test]
    fn root_folder_is_required() {
        let hash = password_hash("caribou");
        let result = Config::parse(&format!("MEMBER_PASSWORD_HASH = '{hash}'\n"));
        assert!(matches!(result, Err(Error::TomlParserError(_))));

        let result = Config::parse(&format!("ROOT_FOLDER_ID = \" \"\nMEMBER_PASSWORD_HASH = '{hash}'\n"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn password_hash_must_be_a_phc_string() {
        let result = Config::parse("ROOT_FOLDER_ID = \"abc\"\nMEMBER_PASSWORD_HASH = \"caribou\"\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let config = Config {
            ROOT_FOLDER_ID: "abc".to_string(),
            MEMBER_PASSWORD_HASH: password_hash("caribou"),
            SECRET_KEY: "s3cr3t".to_string(),
            ..Config::default()
        };
        let serialized = serde_json::to_string(&config).unwrap();
        assert!(!serialized.contains("s3cr3t"));
        assert!(!serialized.contains("argon2"));
        assert!(serialized.contains("ROOT_FOLDER_ID"));
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let result = Config::read_path("does/not/exist.config");
        assert!(matches!(result, Err(Error::FileError(_, _))));
    }
}
