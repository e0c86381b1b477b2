//! Restricts the feed to the weekday bus baseline.

use std::collections::{HashMap, HashSet};

use crate::feed::{BUS_ROUTE_TYPE, GtfsFeed, Route, ServiceCalendar, Trip};

impl ServiceCalendar {
    /// Exactly Monday to Friday, never weekends.
    pub fn is_weekday_only(&self) -> bool {
        self.monday
            && self.tuesday
            && self.wednesday
            && self.thursday
            && self.friday
            && !self.saturday
            && !self.sunday
    }
}

impl Route {
    pub fn is_bus(&self) -> bool {
        self.route_type == BUS_ROUTE_TYPE
    }
}

pub fn weekday_service_ids(calendar: &[ServiceCalendar]) -> HashSet<&str> {
    calendar
        .iter()
        .filter(|service| service.is_weekday_only())
        .map(|service| service.service_id.as_str())
        .collect()
}

pub fn bus_routes(routes: &[Route]) -> HashMap<&str, &Route> {
    routes
        .iter()
        .filter(|route| route.is_bus())
        .map(|route| (route.route_id.as_str(), route))
        .collect()
}

/// A trip that survived both filters, with its route's short name attached.
#[derive(Debug, Clone, Copy)]
pub struct EligibleTrip<'a> {
    pub trip: &'a Trip,
    pub route_short_name: &'a str,
}

#[derive(Debug)]
pub struct ServiceSelection<'a> {
    pub trips: Vec<EligibleTrip<'a>>,
    pub weekday_services: usize,
    pub bus_routes: usize,
}

pub fn select_weekday_bus_trips(feed: &GtfsFeed) -> ServiceSelection<'_> {
    let services = weekday_service_ids(&feed.calendar);
    let routes = bus_routes(&feed.routes);

    let trips = feed
        .trips
        .iter()
        .filter(|trip| services.contains(trip.service_id.as_str()))
        .filter_map(|trip| {
            let route = routes.get(trip.route_id.as_str())?;
            Some(EligibleTrip {
                trip,
                route_short_name: route.route_short_name.as_str(),
            })
        })
        .collect();

    ServiceSelection {
        trips,
        weekday_services: services.len(),
        bus_routes: routes.len(),
    }
}
