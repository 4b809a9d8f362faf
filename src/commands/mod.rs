// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod agent_bills;
pub mod banks;
pub mod bills;
pub mod doctor;
pub mod exporter;
pub mod fx;
pub mod groups;
pub mod other_bills;
pub mod reports;
pub mod users;
