pub mod cache;
pub mod codec;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod orchestration;

pub use cache::{CacheBackend, CacheError, Datastore, MemoryCache, RedisCache};
pub use config::Config;
pub use datasource::{
    DataSourceError, FlightAwareClient, FlightSource, GeminiClient, MockFlightSource,
    MockSpotPriceSource, SpotPriceSource,
};
pub use domain::{
    AirportInfo, Clock, CurrencyPair, Decimal, FlightState, IdentType, ManualClock, SpotQuote,
    SystemClock,
};
pub use engine::{NotificationCategory, Phase, SentNotifications};
pub use error::AppError;
pub use messaging::{Dispatcher, FanoutDispatcher, Message, Recipients, RecordingDispatcher};
pub use orchestration::{
    Coordinator, FlightCacheEntry, FlightPoller, FlightPollerSettings, PollError, SessionHandle,
    SpotPricePoller,
};
