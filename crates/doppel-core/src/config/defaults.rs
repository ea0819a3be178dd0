//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "Doppel".to_string()
}

pub fn default_data_dir() -> String {
    "~/.doppel".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_provider() -> String {
    "ollama".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_contacts_path() -> String {
    "~/.doppel/contacts.json".to_string()
}

pub fn default_trigger_prefix() -> String {
    "1".to_string()
}

pub fn default_debounce_secs() -> u64 {
    9
}

pub fn default_generation_timeout_secs() -> u64 {
    120
}

pub fn default_max_context_turns() -> usize {
    40
}

pub fn default_brief_word_threshold() -> usize {
    10
}

pub fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

pub fn default_ollama_model() -> String {
    "llama3:latest".to_string()
}
