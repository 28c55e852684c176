//! Configuration loading tests

#[cfg(test)]
mod config_tests {
    use anyhow::Result;
    use cardhub_core::{HubConfig, HubError};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        Ok(file)
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let file = write_config(r#"{ "card_source_id": "cards", "event_channel_capacity": 32 }"#)?;
        let config = HubConfig::from_file(file.path())?;

        assert_eq!(config.card_source_id, "cards");
        assert_eq!(config.event_channel_capacity, 32);
        assert_eq!(config.default_data_source, "local-hub");
        assert_eq!(config.log_filter, "info");
        Ok(())
    }

    #[test]
    fn test_invalid_files_are_rejected() -> Result<()> {
        let empty_source = write_config(r#"{ "default_data_source": "" }"#)?;
        assert!(matches!(
            HubConfig::from_file(empty_source.path()),
            Err(HubError::Config(_))
        ));

        let not_json = write_config("card_source_id = 'cards'")?;
        assert!(matches!(
            HubConfig::from_file(not_json.path()),
            Err(HubError::Serialization(_))
        ));

        let dir = tempfile::tempdir()?;
        assert!(matches!(
            HubConfig::from_file(dir.path().join("missing.json")),
            Err(HubError::Io(_))
        ));
        Ok(())
    }
}
