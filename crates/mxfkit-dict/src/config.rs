/// Controls how definitions are loaded into a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryConfig {
    /// When true, a second definition for an identifier is an error instead
    /// of an override.
    pub fail_on_duplicate: bool,
    /// Maximum number of definition files loaded from a directory.
    pub max_files_from_directory: usize,
    /// Maximum bytes allowed per definition file loaded from a directory.
    pub max_file_size: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            fail_on_duplicate: false,
            max_files_from_directory: 256,
            max_file_size: 64 * 1024 * 1024,
        }
    }
}
