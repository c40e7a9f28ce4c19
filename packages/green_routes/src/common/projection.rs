//! Conversion between geographic coordinates (EPSG:4326) and the metric
//! projection used for every distance, length and buffer calculation
//! (EPSG:32643, UTM zone 43N on the WGS84 ellipsoid).
//!
//! The transverse Mercator maths follows the Krüger series expansion to
//! sixth order in the third flattening, which is accurate to well under a
//! millimetre within the zone.

use geo::{Coord, Geometry, LineString, MapCoords, Point};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;

/// EPSG code of the metric projection
pub const PROJECT_EPSG: u32 = 32643;

/// A north-hemisphere UTM zone, holding the series coefficients so they are
/// only computed once
#[derive(Debug, Clone, PartialEq)]
pub struct Utm {
    central_meridian: f64,
    n: f64,
    scaled_a: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
    delta: [f64; 6],
}

impl Utm {
    /// Set up the projection for the provided (northern hemisphere) zone
    pub fn north(zone: u8) -> Self {
        let central_meridian = (zone as f64 * 6.0 - 183.0).to_radians();

        let n = WGS84_F / (2.0 - WGS84_F);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let big_a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0
                - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0
                + 281.0 * n5 / 630.0
                - 1983433.0 * n6 / 1935360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0
                + 15061.0 * n5 / 26880.0
                + 167603.0 * n6 / 181440.0,
            49561.0 * n4 / 161280.0 - 179.0 * n5 / 168.0
                + 6601661.0 * n6 / 7257600.0,
            34729.0 * n5 / 80640.0 - 3418889.0 * n6 / 1995840.0,
            212378941.0 * n6 / 319334400.0,
        ];

        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0
                - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1118711.0 * n6 / 3870720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0
                + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161280.0 - 11.0 * n5 / 504.0
                - 830251.0 * n6 / 7257600.0,
            4583.0 * n5 / 161280.0 - 108847.0 * n6 / 3991680.0,
            20648693.0 * n6 / 638668800.0,
        ];

        let delta = [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3 + 116.0 * n4 / 45.0
                + 26.0 * n5 / 45.0
                - 2854.0 * n6 / 675.0,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0 - 227.0 * n4 / 45.0
                + 2704.0 * n5 / 315.0
                + 2323.0 * n6 / 945.0,
            56.0 * n3 / 15.0 - 136.0 * n4 / 35.0 - 1262.0 * n5 / 105.0
                + 73814.0 * n6 / 2835.0,
            4279.0 * n4 / 630.0 - 332.0 * n5 / 35.0
                - 399572.0 * n6 / 14175.0,
            4174.0 * n5 / 315.0 - 144838.0 * n6 / 6237.0,
            601676.0 * n6 / 22275.0,
        ];

        Utm {
            central_meridian,
            n,
            scaled_a: UTM_K0 * big_a,
            alpha,
            beta,
            delta,
        }
    }

    /// Project a longitude/latitude pair (degrees) to easting/northing
    /// (metres)
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let lambda = lon.to_radians() - self.central_meridian;

        let e_factor = 2.0 * self.n.sqrt() / (1.0 + self.n);
        let t = (phi.sin().atanh() - e_factor * (e_factor * phi.sin()).atanh())
            .sinh();

        let xi_p = t.atan2(lambda.cos());
        let eta_p = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, alpha) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        (
            UTM_FALSE_EASTING + self.scaled_a * eta,
            self.scaled_a * xi,
        )
    }

    /// Convert an easting/northing pair (metres) back to a
    /// longitude/latitude pair (degrees)
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let xi = y / self.scaled_a;
        let eta = (x - UTM_FALSE_EASTING) / self.scaled_a;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();

        let mut phi = chi;
        for (j, delta) in self.delta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            phi += delta * (k * chi).sin();
        }

        let lambda = self.central_meridian + eta_p.sinh().atan2(xi_p.cos());

        (lambda.to_degrees(), phi.to_degrees())
    }
}

/// Projection between EPSG:4326 and EPSG:32643
pub fn project() -> Utm {
    Utm::north(43)
}

/// Project a geographic coordinate to the metric CRS
pub fn to_utm(lon: f64, lat: f64) -> (f64, f64) {
    project().forward(lon, lat)
}

/// Convert a metric coordinate back to a geographic one
pub fn to_wgs84(x: f64, y: f64) -> (f64, f64) {
    project().inverse(x, y)
}

impl Utm {
    pub fn point_to_utm(&self, point: &Point) -> Point {
        self.forward(point.x(), point.y()).into()
    }

    pub fn line_to_utm(&self, line: &LineString) -> LineString {
        line.map_coords(|c| self.coord_to_utm(c))
    }

    pub fn line_to_wgs84(&self, line: &LineString) -> LineString {
        line.map_coords(|c| self.coord_to_wgs84(c))
    }

    pub fn geometry_to_utm(&self, geometry: &Geometry) -> Geometry {
        geometry.map_coords(|c| self.coord_to_utm(c))
    }

    fn coord_to_utm(&self, c: Coord) -> Coord {
        let (x, y) = self.forward(c.x, c.y);
        Coord { x, y }
    }

    fn coord_to_wgs84(&self, c: Coord) -> Coord {
        let (x, y) = self.inverse(c.x, c.y);
        Coord { x, y }
    }
}
