/// Application name
pub const APP_NAME: &str = "hubchat";

/// Hub sub-protocol negotiated during the handshake
pub const HUB_PROTOCOL: &str = "json";

/// Hub sub-protocol version
pub const HUB_PROTOCOL_VERSION: u32 = 1;

/// Separator terminating every record on the hub socket
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Query parameter carrying the credential on the hub URL. WebSocket
/// upgrades cannot carry an Authorization header.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Client-invokable hub methods
pub const METHOD_SEND_MESSAGE: &str = "SendMessage";
pub const METHOD_GET_CONVERSATION: &str = "GetConversation";

/// Server-pushed hub events
pub const EVENT_RECEIVE_MESSAGE: &str = "ReceiveMessage";
pub const EVENT_MESSAGE_SENT: &str = "MessageSent";
pub const EVENT_CONVERSATION_HISTORY: &str = "ConversationHistory";
pub const EVENT_USER_REGISTERED: &str = "UserRegistered";
pub const EVENT_ERROR: &str = "Error";

/// Reconnect delays in seconds; the last entry repeats forever
pub const RECONNECT_DELAYS_SECS: [u64; 4] = [0, 2, 10, 30];

/// Default keep-alive ping interval in seconds
pub const DEFAULT_KEEPALIVE_SECS: u64 = 15;

/// Default time without inbound traffic before the hub is considered lost
pub const DEFAULT_SERVER_TIMEOUT_SECS: u64 = 30;

/// Default bound on the opening handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 15;

/// Durable storage keys for the session slot
pub const STORAGE_KEY_TOKEN: &str = "token";
pub const STORAGE_KEY_USER_ID: &str = "userId";
pub const STORAGE_KEY_USERNAME: &str = "username";

/// REST paths, relative to the API base URL
pub const PATH_USERS: &str = "/users";
pub const PATH_LOGIN: &str = "/auth/login";
pub const PATH_REGISTER: &str = "/auth/register";
