//! Month-by-month meal pagination.
//!
//! `MealPager` keeps an append-only, de-duplicated list of upcoming meals for
//! the current session. Each month's raw API result is cached through the
//! `CacheManager`; the accumulated list itself is never persisted.
//!
//! Pagination stops at a horizon one year and two months past the real
//! present. An empty month does not end pagination, since schools publish
//! menus late. While fewer than `auto_load_threshold` meals are loaded the
//! pager keeps pulling the next month on its own.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::{MealQuery, SchoolApi};
use crate::cache::{CacheKey, CacheKind, CacheManager};
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{MealKey, MealRecord, SchoolRef, YearMonth};
use crate::settings::{Settings, SettingsProvider};

/// Keep loading months until at least this many meals are listed
pub const AUTO_LOAD_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerOptions {
    /// `0` disables automatic loading
    pub auto_load_threshold: usize,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            auto_load_threshold: AUTO_LOAD_THRESHOLD,
        }
    }
}

/// Observable pager state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealFeed {
    pub meals: Vec<MealRecord>,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub current_month: YearMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A month was fetched; `added` new meals survived de-duplication
    Appended { added: usize },
    /// The next month is past the horizon; `has_more` is now false
    HorizonReached,
    /// Nothing was done: a load was in flight, pagination had ended, the
    /// pager was reset or closed meanwhile, or a silent load failed
    Skipped,
}

struct PagerState {
    current_month: YearMonth,
    has_more: bool,
    meals: Vec<MealRecord>,
    loading: bool,
    /// Bumped on every reset; fetches started under an older generation are dropped
    generation: u64,
    /// Display flags the cached meals were fetched with
    flags: MealFlags,
}

impl PagerState {
    fn initial(month: YearMonth, flags: MealFlags, generation: u64) -> Self {
        Self {
            current_month: month,
            has_more: true,
            meals: Vec::new(),
            loading: false,
            generation,
            flags,
        }
    }
}

/// Settings that change what the meal endpoint returns. Cached meal payloads
/// are only valid for the flags they were fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MealFlags {
    show_allergy: bool,
    show_origin: bool,
    show_nutrition: bool,
}

impl MealFlags {
    fn of(settings: &Settings) -> Self {
        Self {
            show_allergy: settings.show_allergy,
            show_origin: settings.show_origin,
            show_nutrition: settings.show_nutrition,
        }
    }
}

/// Clears the in-flight flag when a `load_more` ends or is dropped.
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Append records dated `today` or later whose `(date, type)` is not listed yet
fn append_unique(
    meals: &mut Vec<MealRecord>,
    candidates: &[MealRecord],
    today: chrono::NaiveDate,
) -> usize {
    let mut seen: HashSet<MealKey> = meals.iter().map(MealRecord::key).collect();
    let before = meals.len();
    for record in candidates {
        if record.is_on_or_after(today) && seen.insert(record.key()) {
            meals.push(record.clone());
        }
    }
    meals.len() - before
}

pub struct MealPager {
    api: Arc<dyn SchoolApi>,
    cache: CacheManager,
    settings: SettingsProvider,
    clock: Arc<dyn Clock>,
    options: PagerOptions,
    state: Mutex<PagerState>,
    loading_more: AtomicBool,
    closed: AtomicBool,
    feed: watch::Sender<MealFeed>,
}

impl MealPager {
    pub fn new(
        api: Arc<dyn SchoolApi>,
        cache: CacheManager,
        settings: SettingsProvider,
        clock: Arc<dyn Clock>,
        options: PagerOptions,
    ) -> Self {
        let month = YearMonth::of(clock.today());
        let state = PagerState::initial(month, MealFlags::of(&settings.current()), 0);
        let (feed, _) = watch::channel(MealFeed {
            meals: Vec::new(),
            has_more: state.has_more,
            loading: false,
            loading_more: false,
            current_month: month,
        });

        Self {
            api,
            cache,
            settings,
            clock,
            options,
            state: Mutex::new(state),
            loading_more: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            feed,
        }
    }

    /// Snapshot of the current state
    pub fn feed(&self) -> MealFeed {
        self.feed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MealFeed> {
        self.feed.subscribe()
    }

    /// Stop applying results. Fetches already in flight finish but are discarded.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, state: &PagerState) {
        self.feed.send_replace(MealFeed {
            meals: state.meals.clone(),
            has_more: state.has_more,
            loading: state.loading,
            loading_more: self.loading_more.load(Ordering::SeqCst),
            current_month: state.current_month,
        });
    }

    async fn publish_current(&self) {
        let state = self.state.lock().await;
        self.publish(&state);
    }

    /// Cached month or a fresh fetch. The fresh result is only written to the
    /// cache while `generation` is still current, so a fetch that outlives a
    /// purge cannot put a payload for stale flags back.
    async fn fetch_month(
        &self,
        school: &SchoolRef,
        settings: &Settings,
        month: YearMonth,
        generation: u64,
    ) -> Result<Vec<MealRecord>> {
        let key = CacheKey::meal_month(school, month);
        if let Some(cached) = self.cache.get(&key).await? {
            return Ok(cached);
        }
        let query = MealQuery {
            school: school.clone(),
            year: month.year,
            month: month.month,
            day: None,
            show_allergy: settings.show_allergy,
            show_origin: settings.show_origin,
            show_nutrition: settings.show_nutrition,
        };
        let fresh = self.api.fetch_meal(&query).await?;

        // Held across the write so a reset cannot slip in between the check and the set
        let state = self.state.lock().await;
        if state.generation == generation && !self.is_closed() {
            self.cache.set(&key, &fresh).await?;
        } else {
            debug!(%month, "Not caching meals fetched before reset");
        }
        Ok(fresh)
    }

    /// Load the present month's upcoming meals, replacing the list.
    /// Returns how many meals the present month contributed.
    pub async fn load_initial(&self) -> Result<usize> {
        if self.is_closed() {
            return Ok(0);
        }
        let settings = self.settings.current();
        let school = settings.require_school()?.clone();
        let today = self.clock.today();
        let month = YearMonth::of(today);

        let generation = {
            let mut state = self.state.lock().await;
            state.loading = true;
            self.publish(&state);
            state.generation
        };

        let result = self.fetch_month(&school, &settings, month, generation).await;

        let count = {
            let mut state = self.state.lock().await;
            if state.generation != generation || self.is_closed() {
                debug!(%month, "Discarding meals fetched before reset");
                return Ok(0);
            }
            state.loading = false;
            let records = match result {
                Ok(records) => records,
                Err(e) => {
                    self.publish(&state);
                    return Err(e);
                }
            };

            let mut meals = Vec::new();
            let count = append_unique(&mut meals, &records, today);
            state.meals = meals;
            state.current_month = month;
            state.has_more = true;
            self.publish(&state);
            count
        };
        debug!(%month, count, "Initial meals loaded");

        self.auto_fill().await;
        Ok(count)
    }

    /// Fetch the next month and append its new meals.
    ///
    /// With `silent` set, fetch failures are logged and reported as
    /// `LoadOutcome::Skipped` instead of returned.
    pub async fn load_more(&self, silent: bool) -> Result<LoadOutcome> {
        let outcome = match self.load_more_once().await {
            Ok(outcome) => outcome,
            Err(e) if silent => {
                warn!(error = %e, "Failed to load more meals");
                return Ok(LoadOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        if matches!(outcome, LoadOutcome::Appended { .. }) {
            self.auto_fill().await;
        }
        Ok(outcome)
    }

    async fn load_more_once(&self) -> Result<LoadOutcome> {
        let Some(in_flight) = InFlight::acquire(&self.loading_more) else {
            debug!("Meal load already in flight");
            return Ok(LoadOutcome::Skipped);
        };
        self.publish_current().await;

        let outcome = self.advance().await;

        drop(in_flight);
        self.publish_current().await;
        outcome
    }

    async fn advance(&self) -> Result<LoadOutcome> {
        if self.is_closed() {
            return Ok(LoadOutcome::Skipped);
        }
        let settings = self.settings.current();
        let school = settings.require_school()?.clone();
        let today = self.clock.today();

        let (next, generation) = {
            let mut state = self.state.lock().await;
            if !state.has_more {
                return Ok(LoadOutcome::Skipped);
            }
            let next = state.current_month.next();
            let horizon = YearMonth::horizon(today);
            if next > horizon {
                state.has_more = false;
                self.publish(&state);
                info!(%horizon, "Reached the meal pagination horizon");
                return Ok(LoadOutcome::HorizonReached);
            }
            (next, state.generation)
        };

        let records = self.fetch_month(&school, &settings, next, generation).await?;

        let mut state = self.state.lock().await;
        if state.generation != generation || self.is_closed() {
            debug!(month = %next, "Discarding meals fetched before reset");
            return Ok(LoadOutcome::Skipped);
        }
        state.current_month = next;
        let added = append_unique(&mut state.meals, &records, today);
        if !records.is_empty() {
            state.has_more = true;
        }
        self.publish(&state);
        debug!(month = %next, fetched = records.len(), added, "More meals loaded");
        Ok(LoadOutcome::Appended { added })
    }

    /// Keep loading months while the list is short. Bounded by the horizon.
    async fn auto_fill(&self) {
        loop {
            if self.is_closed() {
                break;
            }
            let wants_more = {
                let state = self.state.lock().await;
                state.has_more && state.meals.len() < self.options.auto_load_threshold
            };
            if !wants_more {
                break;
            }
            match self.load_more_once().await {
                Ok(LoadOutcome::Appended { .. }) => continue,
                Ok(_) => break,
                Err(e) => {
                    warn!(error = %e, "Automatic meal load failed");
                    break;
                }
            }
        }
    }

    /// Back to the present month with an empty list and `has_more = true`
    pub async fn reset(&self) {
        let month = YearMonth::of(self.clock.today());
        let flags = MealFlags::of(&self.settings.current());
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = PagerState::initial(month, flags, generation);
        self.publish(&state);
    }

    /// Run `on_allergy_preference_changed` if the allergy, origin or nutrition
    /// flag differs from the ones the list was loaded with. Returns whether it did.
    pub async fn sync_settings(&self) -> Result<bool> {
        let flags = MealFlags::of(&self.settings.current());
        let changed = self.state.lock().await.flags != flags;
        if changed {
            self.on_allergy_preference_changed().await?;
        }
        Ok(changed)
    }

    /// Cached meal payloads carry allergy annotations, so every cached meal
    /// entry is dropped and pagination starts over.
    pub async fn on_allergy_preference_changed(&self) -> Result<()> {
        self.reload_all().await?;
        Ok(())
    }

    /// Drop every cached meal entry for all months and days, then load the
    /// present month again. Returns the new initial count.
    pub async fn reload_all(&self) -> Result<usize> {
        // Reset first: fetches still in flight then skip their cache write
        self.reset().await;
        let removed = self.cache.clear_kind(CacheKind::Meal).await?;
        info!(removed, "Meal cache cleared");
        self.load_initial().await
    }

    /// Drop the cached months this session has seen, then start over.
    pub async fn refresh(&self) -> Result<usize> {
        let school = self.settings.current().require_school()?.clone();
        let present = YearMonth::of(self.clock.today());
        let last = self.state.lock().await.current_month.max(present);

        let keys: Vec<CacheKey> = present
            .through(last)
            .into_iter()
            .map(|month| CacheKey::meal_month(&school, month))
            .collect();
        self.reset().await;
        futures::future::join_all(keys.iter().map(|key| self.cache.invalidate(key))).await;
        debug!(months = keys.len(), "Meal cache invalidated for refresh");

        self.load_initial().await
    }
}

// ============================================================================
// Tests
// ============================================================================
