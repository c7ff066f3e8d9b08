// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod users;
pub mod sessions;
pub mod verify;
pub mod accounts;
pub mod twofactor;
pub mod subscriptions;
pub mod portfolio;
pub mod transactions;
pub mod favorites;
pub mod reports;
pub mod exporter;
pub mod doctor;
pub mod settings;
