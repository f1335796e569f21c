// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Package catalog and the quota ledger.
//!
//! The quota integer is the only shared mutable resource in the core. It is
//! mutated exclusively through [`PackageRecord::try_reserve`] (atomic
//! conditional decrement, fails closed) and [`PackageRecord::release`]
//! (unconditional increment) while the caller holds the booking row lock,
//! never through a separate read followed by a separate write.

use crate::base::PackageId;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-tier seat prices at a point in time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierPrices {
    pub quad: Decimal,
    pub triple: Decimal,
    pub double: Decimal,
}

#[derive(Debug)]
struct PackageData {
    title: String,
    prices: TierPrices,
    quota: u32,
    closed: bool,
}

/// Read-only view of a package row, taken under its lock.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageSnapshot {
    pub id: PackageId,
    pub title: String,
    pub prices: TierPrices,
    pub quota: u32,
    pub closed: bool,
}

/// A catalog row guarding the sellable quota of one travel package.
#[derive(Debug)]
pub struct PackageRecord {
    id: PackageId,
    inner: Mutex<PackageData>,
}

impl PackageRecord {
    fn new(id: PackageId, title: String, prices: TierPrices, quota: u32, closed: bool) -> Self {
        Self {
            id,
            inner: Mutex::new(PackageData {
                title,
                prices,
                quota,
                closed,
            }),
        }
    }

    pub fn snapshot(&self) -> PackageSnapshot {
        let data = self.inner.lock();
        PackageSnapshot {
            id: self.id,
            title: data.title.clone(),
            prices: data.prices,
            quota: data.quota,
            closed: data.closed,
        }
    }

    /// Atomic conditional decrement: `quota -= pax` only when `quota >= pax`.
    ///
    /// Returns `false` and leaves the quota untouched when the remaining
    /// inventory is insufficient. The quota can never go negative.
    pub fn try_reserve(&self, pax: u32) -> bool {
        let mut data = self.inner.lock();
        if data.quota >= pax {
            data.quota -= pax;
            true
        } else {
            false
        }
    }

    /// Unconditional increment: returning inventory never fails a bound check.
    pub fn release(&self, pax: u32) {
        let mut data = self.inner.lock();
        data.quota += pax;
    }

    pub fn quota(&self) -> u32 {
        self.inner.lock().quota
    }

    pub fn set_closed(&self, closed: bool) {
        self.inner.lock().closed = closed;
    }
}

/// Package catalog indexed by package ID.
///
/// Catalog management (pricing, content, lifecycle) is an external concern;
/// this store only carries what the reservation core reads: title, current
/// tier prices, the open/closed flag, and the quota.
pub struct PackageCatalog {
    packages: DashMap<PackageId, PackageRecord>,
    next_id: AtomicU64,
}

impl PackageCatalog {
    pub fn new() -> Self {
        Self {
            packages: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a package and returns its assigned ID.
    pub fn insert(&self, title: &str, prices: TierPrices, quota: u32, closed: bool) -> PackageId {
        let id = PackageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.packages
            .insert(id, PackageRecord::new(id, title.to_string(), prices, quota, closed));
        id
    }

    pub fn get(
        &self,
        id: &PackageId,
    ) -> Option<dashmap::mapref::one::Ref<'_, PackageId, PackageRecord>> {
        self.packages.get(id)
    }
}

impl Default for PackageCatalog {
    fn default() -> Self {
        Self::new()
    }
}
