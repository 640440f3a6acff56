use crate::database::Database;
use crate::dialogue::DialogueStore;
use crate::wanxiao;

/// Shared handle passed to every handler through the dispatcher's
/// dependency map. Cloning is cheap: the pool, the HTTP client and the
/// dialogue store are all reference-counted internally.
#[derive(Clone)]
pub struct BotState {
    pub db: Database,
    pub client: wanxiao::Client,
    pub dialogues: DialogueStore,
}

impl BotState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            client: wanxiao::Client::new(),
            dialogues: DialogueStore::new(),
        }
    }
}
